//! Taxonomy cache backends for the CIFAR pyramid pipeline.
//!
//! Both backends implement [`pyramid_core::TaxonomyStore`]:
//!
//! - [`FileTaxonomyStore`]: a single JSON file, the default for real runs
//! - [`InMemoryTaxonomyStore`]: process-local, for tests and benches

pub mod file;
pub mod memory;

pub use file::FileTaxonomyStore;
pub use memory::InMemoryTaxonomyStore;

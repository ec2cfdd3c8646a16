//! CLI entry point for the CIFAR pyramid pipeline.
//!
//! Subcommands:
//!   build-taxonomy  -- Scan the CIFAR-100 training split and (re)write the taxonomy cache
//!   show-taxonomy   -- Print the cached taxonomy
//!   partition       -- Partition and normalize the corpus, print a summary
//!   prepare         -- Prepare a single-head classification dataset, print its shapes
//!
//! Usage:
//!   cargo run --bin pyramid -- build-taxonomy
//!   cargo run --bin pyramid -- --config pipeline/pipeline.example.yaml partition
//!   cargo run --bin pyramid -- prepare --dataset cifar100_fine

use clap::{Parser, Subcommand};
use pyramid_core::{DatasetId, PipelineConfig, Route, Taxonomy, TaxonomyStore};
use pyramid_pipeline::config::load_config;
use pyramid_pipeline::corpus::CifarBinaryLoader;
use pyramid_pipeline::datasets::{load_classification, prepare_pyramid};
use pyramid_pipeline::taxonomy::rebuild_taxonomy;
use pyramid_storage::FileTaxonomyStore;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "pyramid", about = "Hierarchical CIFAR dataset preparation")]
struct Cli {
    /// YAML configuration file. Defaults apply when omitted.
    #[arg(long, env = "PYRAMID_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the taxonomy cache location.
    #[arg(long, global = true)]
    taxonomy_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the taxonomy cache from the CIFAR-100 training split.
    BuildTaxonomy,

    /// Print the cached taxonomy.
    ShowTaxonomy,

    /// Partition the corpus into joint, gate and test collections.
    Partition,

    /// Prepare a classification dataset.
    Prepare {
        /// One of: cifar10, cifar100_coarse, cifar100_fine, cifar100_joint_fine_only
        #[arg(long)]
        dataset: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_pipeline_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    if let Err(e) = run(cli.command, &config) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Load configuration from `--config` / `PYRAMID_CONFIG`, or fall back to defaults.
fn load_pipeline_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = &cli.taxonomy_path {
        config.taxonomy.cache_path = path.clone();
    }
    Ok(config)
}

fn init_tracing(config: &PipelineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: Command, config: &PipelineConfig) -> anyhow::Result<()> {
    let source = CifarBinaryLoader::from_config(&config.data);
    let store = FileTaxonomyStore::new(&config.taxonomy.cache_path);

    match command {
        Command::BuildTaxonomy => {
            let taxonomy = rebuild_taxonomy(&source, &store)?;
            print_taxonomy(&taxonomy);
            println!("\nSaved to {}", store.location());
        }

        Command::ShowTaxonomy => {
            let taxonomy = store.load()?;
            print_taxonomy(&taxonomy);
        }

        Command::Partition => {
            let data = prepare_pyramid(&source, &store, config)?;
            let p = &data.partition;
            println!(
                "Label sets: joint={} gate={} test_only={}",
                p.sets.joint.len(),
                p.sets.gate.len(),
                p.sets.test_only.len()
            );
            println!("  joint: {} samples", p.joint.len());
            println!(
                "  gate:  {} samples ({} fine, {} coarse)",
                p.gate.len(),
                p.gate.count(Route::Fine),
                p.gate.count(Route::Coarse)
            );
            println!(
                "  test:  {} samples ({} fine, {} coarse)",
                p.test.len(),
                p.test.count(Route::Fine),
                p.test.count(Route::Coarse)
            );
            match data.normalizer {
                Some(n) => println!(
                    "  normalization: mean={:.4} scale={:.4} epsilon={:e}",
                    n.mean, n.scale, n.epsilon
                ),
                None => println!("  normalization: disabled"),
            }
        }

        Command::Prepare { dataset } => {
            let dataset: DatasetId = dataset.parse()?;
            let data = load_classification(dataset, &source, &store, config)?;
            info!(%dataset, "Prepared dataset");
            println!("{dataset} ({} classes)", dataset.n_classes());
            for (name, split) in [
                ("train", &data.train),
                ("validation", &data.validation),
                ("test", &data.test),
            ] {
                println!(
                    "  {name:<10} images={:?} targets={:?}",
                    split.images.dims(),
                    split.targets.dims()
                );
            }
        }
    }

    Ok(())
}

fn print_taxonomy(taxonomy: &Taxonomy) {
    println!(
        "{} coarse labels, {} fine labels",
        taxonomy.len(),
        taxonomy.fine_count()
    );
    for (coarse, fines) in taxonomy.iter() {
        println!("  {coarse}: {}", fines.join(", "));
    }
}

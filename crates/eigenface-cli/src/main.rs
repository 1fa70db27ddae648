use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eigenface_core::cache;
use eigenface_core::{
    CacheError, CachePolicy, DistanceMetric, FaceSpaceRegistry, RegistryConfig, RegistryError,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod loader;

#[derive(Parser)]
#[command(name = "eigenface", about = "Eigenface face-space training and recognition")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Faces per training group
    #[arg(long, global = true)]
    group_size: Option<usize>,
    /// Eigenfaces retained per face space
    #[arg(long, global = true)]
    components: Option<usize>,
    /// Reject matches farther than this distance
    #[arg(long, global = true)]
    threshold: Option<f64>,
    /// Distance metric: euclidean or manhattan
    #[arg(long, global = true)]
    metric: Option<DistanceMetric>,
    /// Directory for cached face spaces
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build face spaces from a directory of training images
    Train {
        dir: PathBuf,
        /// Rebuild every face space even if a cached copy exists
        #[arg(long)]
        refresh_cache: bool,
    },
    /// Recognize a face image against face spaces trained from a directory
    Recognize {
        dir: PathBuf,
        image: PathBuf,
        /// Rebuild every face space even if a cached copy exists
        #[arg(long)]
        refresh_cache: bool,
    },
    /// Summarize a cached face space file
    Inspect { file: PathBuf },
}

impl Cli {
    fn apply_overrides(&self, registry: &mut RegistryConfig) {
        if let Some(v) = self.group_size {
            registry.group_size = v;
        }
        if let Some(v) = self.components {
            registry.components = Some(v);
        }
        if let Some(v) = self.threshold {
            registry.threshold = Some(v);
        }
        if let Some(v) = self.metric {
            registry.metric = v;
        }
        if let Some(v) = &self.cache_dir {
            registry.cache_dir = Some(v.clone());
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = config::Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config.registry);

    match cli.command {
        Commands::Train { dir, refresh_cache } => {
            let registry = train(config.registry, &dir, refresh_cache)?;
            for (i, space) in registry.spaces().iter().enumerate() {
                println!(
                    "space {i}: {}x{} px, {} components, faces: {}",
                    space.width(),
                    space.height(),
                    space.components(),
                    space.identifiers().join(", ")
                );
            }
        }
        Commands::Recognize {
            dir,
            image,
            refresh_cache,
        } => {
            let registry = train(config.registry, &dir, refresh_cache)?;
            let query = loader::decode_image(&image)?;
            match registry.recognize(&query.pixels)? {
                Some(recognition) => match recognition.identifier() {
                    Some(id) => println!("{id}\tdistance {:.4}", recognition.distance()),
                    None => println!(
                        "unknown\tnearest {} at distance {:.4}",
                        recognition.best.identifier,
                        recognition.distance()
                    ),
                },
                None => println!("no face spaces trained from {}", dir.display()),
            }
        }
        Commands::Inspect { file } => {
            let entry = cache::read_entry(&file)
                .with_context(|| format!("reading cache file {}", file.display()))?;
            let space = &entry.face_space;
            println!("key:         {}", entry.key);
            println!("created:     {}", entry.created_at);
            println!("dimensions:  {}x{}", space.width(), space.height());
            println!("components:  {}", space.components());
            println!("eigenvalues: {:?}", space.eigenvalues().to_vec());
            println!("faces:       {}", space.identifiers().join(", "));
        }
    }

    Ok(())
}

/// Load the training directory and build (or load cached) face spaces.
fn train(config: RegistryConfig, dir: &Path, refresh_cache: bool) -> Result<FaceSpaceRegistry> {
    let groups = loader::load_training_groups(dir, config.group_size)?;
    let policy = if refresh_cache {
        CachePolicy::Refresh
    } else {
        CachePolicy::Reuse
    };

    let mut registry = FaceSpaceRegistry::new(config);
    let report = match registry.build_with_policy(groups, policy) {
        Ok(report) => report,
        Err(e @ RegistryError::Cache(CacheError::Incompatible { .. })) => {
            return Err(anyhow::Error::new(e)
                .context("cached face space is unusable; rerun with --refresh-cache"));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        spaces = registry.len(),
        built = report.built,
        loaded = report.loaded,
        "training complete"
    );
    Ok(registry)
}

// Command line interface
// Parses flags, layers them over the config and dispatches pipeline commands

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::config::{Config, ConfigError};
use crate::manifest::Manifest;
use crate::pipeline::{
    BatchProcessor, BatchReport, IndexBuilder, PipelineError, RunTrace, TraceWriter, Verifier,
    VerifyReport,
};

#[derive(Debug, Parser)]
#[command(name = "mfcc-cache", version, about = "Cache MFCC features for a fold-partitioned audio corpus")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable the progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compute features for every manifest row that is not cached yet
    Extract {
        /// Re-read existing entries and recompute corrupt ones
        #[arg(long)]
        revalidate: bool,
    },

    /// Report how many manifest rows have a cache entry
    Verify {
        /// Also load each entry and count unreadable ones as missing
        #[arg(long)]
        deep: bool,
    },

    /// Write the feature index for all cached rows
    Index,

    /// Extract, then verify, then index
    All {
        #[arg(long)]
        revalidate: bool,

        #[arg(long)]
        deep: bool,
    },
}

/// Flags layered over the config file
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub manifest: Option<PathBuf>,

    #[arg(long, global = true)]
    pub audio_root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub cache_root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub index_path: Option<PathBuf>,

    /// Append a JSONL trace of extraction runs to this file
    #[arg(long, global = true)]
    pub trace: Option<PathBuf>,

    /// Clip length in seconds
    #[arg(long, global = true)]
    pub duration: Option<u32>,

    #[arg(long, global = true)]
    pub sample_rate: Option<u32>,

    /// Number of MFCC coefficients
    #[arg(long, global = true)]
    pub n_mfcc: Option<usize>,

    /// Fold directories to create up front, e.g. 1,2,3
    #[arg(long, global = true, value_delimiter = ',')]
    pub folds: Option<Vec<u32>>,
}

impl Overrides {
    /// Defaults, then the config file, then flags
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(v) = &self.manifest {
            config.manifest_path = v.clone();
        }
        if let Some(v) = &self.audio_root {
            config.audio_root = v.clone();
        }
        if let Some(v) = &self.cache_root {
            config.cache_root = v.clone();
        }
        if let Some(v) = &self.index_path {
            config.index_path = v.clone();
        }
        if let Some(v) = &self.trace {
            config.trace_path = Some(v.clone());
        }
        if let Some(v) = self.duration {
            config.target_duration_secs = v;
        }
        if let Some(v) = self.sample_rate {
            config.sample_rate = v;
        }
        if let Some(v) = self.n_mfcc {
            config.coefficient_count = v;
        }
        if let Some(v) = &self.folds {
            config.folds = Some(v.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

/// What a command did, stage by stage. Stages that did not run stay `None`.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub extract: Option<BatchReport>,
    pub verify: Option<VerifyReport>,
    pub indexed: Option<usize>,
}

/// Run one command. Config and manifest errors abort before anything touches the cache.
pub fn execute(cli: &Cli) -> Result<RunSummary, PipelineError> {
    let config = cli.overrides.resolve()?;
    let manifest = Manifest::from_path(&config.manifest_path)?;
    log::info!(
        "Loaded manifest {} ({} rows, {} folds)",
        config.manifest_path.display(),
        manifest.len(),
        manifest.folds().len()
    );

    let mut summary = RunSummary::default();
    match &cli.command {
        Command::Extract { revalidate } => {
            summary.extract = Some(extract(&config, &manifest, *revalidate, cli.no_progress)?);
        }
        Command::Verify { deep } => {
            summary.verify = Some(verify(&config, &manifest, *deep));
        }
        Command::Index => {
            summary.indexed = Some(index(&config, &manifest)?);
        }
        Command::All { revalidate, deep } => {
            summary.extract = Some(extract(&config, &manifest, *revalidate, cli.no_progress)?);
            summary.verify = Some(verify(&config, &manifest, *deep));
            summary.indexed = Some(index(&config, &manifest)?);
        }
    }

    Ok(summary)
}

fn extract(
    config: &Config,
    manifest: &Manifest,
    revalidate: bool,
    no_progress: bool,
) -> Result<BatchReport, PipelineError> {
    let store = config.cache_store();
    if let Some(folds) = &config.folds {
        store.prepare(folds)?;
    }

    let trace = RunTrace::new(config.trace_path.clone().map(TraceWriter::new));
    let processor = BatchProcessor::new(store, &config.audio_root, config.batch_options(revalidate))?
        .with_trace(trace)
        .with_progress(progress_bar(manifest.len() as u64, no_progress));

    let report = processor.run(manifest);
    println!("\nTask Completed");
    Ok(report)
}

fn verify(config: &Config, manifest: &Manifest, deep: bool) -> VerifyReport {
    let store = config.cache_store();
    let verifier = Verifier::new(&store);
    let report = if deep {
        verifier.verify_deep(manifest)
    } else {
        verifier.verify(manifest)
    };

    println!("{}", report);
    report
}

fn index(config: &Config, manifest: &Manifest) -> Result<usize, PipelineError> {
    let store = config.cache_store();
    let count = IndexBuilder::new(&store).build_and_write(manifest, &config.index_path)?;
    println!("Saved metadata for {} MFCC files", count);
    Ok(count)
}

fn progress_bar(total: u64, disabled: bool) -> ProgressBar {
    if disabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    match ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})") {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => log::debug!("Falling back to default progress style: {}", e),
    }
    pb
}

use clap::{Args, Parser, Subcommand};
use cli::RunConfig;
use color_eyre::eyre::{eyre, Result};
use section_batch::{
    validate_directory, MetadataStore, Resolution, SectionJob, SpecimenMetadata,
    Stage, StageRecord, StaticMetadataStore,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the input directory without processing anything
    Validate(BatchArgs),
    /// Write the tissue mask of every section
    Mask(BatchArgs),
    /// Clean every section with its existing mask
    Clean(BatchArgs),
    /// Mask and clean each section in one pass
    Run(BatchArgs),
    /// Print the JSON schema of the run configuration
    Schema {
        /// Write the schema here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Clone)]
struct BatchArgs {
    /// Run configuration (.toml or .json)
    #[arg(short, long)]
    config: PathBuf,
    /// Specimen id, e.g. DK39
    #[arg(short, long)]
    specimen: Option<String>,
    /// Channel to process
    #[arg(long, default_value_t = 1)]
    channel: u8,
    /// thumbnail or full
    #[arg(short, long, default_value = "thumbnail")]
    resolution: Resolution,
    /// Worker count, overrides the configuration
    #[arg(short, long)]
    workers: Option<usize>,
    /// Per-section timeout in seconds, overrides the configuration
    #[arg(long)]
    timeout: Option<u64>,
    /// Single worker, log accepted regions and mark them on the masks
    #[arg(long)]
    debug: bool,
}

/// Configuration and specimen context resolved from the arguments
struct Context {
    args: BatchArgs,
    config: RunConfig,
    store: Option<StaticMetadataStore>,
    metadata: Option<SpecimenMetadata>,
}

impl Context {
    fn load(args: &BatchArgs) -> Result<Self> {
        let mut config = RunConfig::from_file(&args.config)?;
        if let Some(workers) = args.workers {
            config.workers = workers;
        }
        if let Some(timeout) = args.timeout {
            config.timeout_secs = timeout;
        }
        if args.debug {
            config.workers = 1;
            config.mask.debug = true;
        }

        let store = config
            .metadata
            .as_ref()
            .map(StaticMetadataStore::from_file)
            .transpose()?;
        let metadata = match (&store, &args.specimen) {
            (Some(store), Some(id)) => Some(store.specimen(id)?),
            (None, Some(id)) => {
                warn!("No metadata file configured, specimen {id} has no canvas");
                None
            }
            _ => None,
        };

        Ok(Self {
            args: args.clone(),
            config,
            store,
            metadata,
        })
    }

    fn specimen(&self) -> Option<&str> {
        self.args.specimen.as_deref()
    }

    async fn run_job(&self, job: SectionJob) -> Result<()> {
        let summary = self
            .config
            .run_job(
                job,
                self.specimen(),
                self.args.channel,
                self.args.resolution,
                self.metadata.as_ref(),
            )
            .await?;
        println!("{summary}");
        if !summary.is_success() {
            return Err(eyre!("{} section(s) failed", summary.failures.len()));
        }

        if let (Some(store), Some(id)) = (&self.store, self.specimen()) {
            let stages: &[Stage] = match job {
                SectionJob::Mask => &[Stage::Mask],
                SectionJob::Clean => &[Stage::Clean],
                SectionJob::Full => &[Stage::Mask, Stage::Clean],
            };
            for &stage in stages {
                store.mark_stage_complete(
                    id,
                    StageRecord {
                        stage,
                        channel: self.args.channel,
                        resolution: self.args.resolution,
                    },
                )?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let paths = self
            .config
            .batch_paths(self.specimen(), self.args.channel, self.args.resolution);
        let rules = self
            .config
            .validation_rules(self.args.resolution, self.metadata.as_ref())
            .unwrap_or_else(|| section_batch::ValidationRules::for_resolution(self.args.resolution));

        let report = validate_directory(&paths.input_dir, &rules);
        println!("{report}");
        if report.is_valid() {
            Ok(())
        } else {
            Err(eyre!("{} problem(s) found", report.violations.len()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Validate(args) => Context::load(args)?.validate()?,
        Commands::Mask(args) => Context::load(args)?.run_job(SectionJob::Mask).await?,
        Commands::Clean(args) => Context::load(args)?.run_job(SectionJob::Clean).await?,
        Commands::Run(args) => Context::load(args)?.run_job(SectionJob::Full).await?,
        Commands::Schema { output } => {
            let schema = serde_json::to_string_pretty(&RunConfig::schema())?;
            match output {
                Some(path) => {
                    std::fs::write(path, schema)?;
                    info!("Schema written to {}", path.display());
                }
                None => println!("{schema}"),
            }
        }
    }

    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use ajh_pipeline::{load_profile, Pipeline, PipelineConfig};
use ajh_storage::ResultsStore;
use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "ajh-cli")]
#[command(about = "Australian job hunter command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Args, Default)]
struct ProfileOverrides {
    /// Profile JSON path, overriding AJH_PROFILE.
    #[arg(long)]
    profile: Option<PathBuf>,
    /// Override maxHoursSincePosted.
    #[arg(long)]
    hours: Option<u32>,
    /// Prepend a preferred location.
    #[arg(long)]
    location: Option<String>,
    /// Override minScore.
    #[arg(long)]
    min_score: Option<f64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one fetch-score-report cycle.
    Run {
        #[command(flatten)]
        overrides: ProfileOverrides,
    },
    /// Run the HTTP API, with scheduled runs if enabled.
    Serve,
    /// Re-render the email digest from the latest run's results.
    Digest {
        #[command(flatten)]
        overrides: ProfileOverrides,
    },
    /// Apply pending database migrations.
    Migrate,
    /// Print a markdown rollup of the most recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run {
        overrides: ProfileOverrides::default(),
    }) {
        Commands::Run { overrides } => {
            let config = PipelineConfig::from_env();
            let profile = load_overridden_profile(&config, &overrides)?;
            let database_url = config.database_url.clone();
            let mut pipeline = Pipeline::new(config)?;
            if let Some(url) = database_url {
                pipeline = pipeline.with_store(ResultsStore::connect(&url).await?);
            }
            let summary = pipeline.run_with_profile(Uuid::new_v4(), &profile).await?;
            println!(
                "run complete: run_id={} ranked={} digest={} reports={}",
                summary.run_id, summary.ranked, summary.digest_count, summary.reports_dir
            );
        }
        Commands::Serve => {
            let scheduler_pipeline = Arc::new(Pipeline::new(PipelineConfig::from_env())?);
            let scheduler = scheduler_pipeline.maybe_build_scheduler().await?;
            if let Some(scheduler) = &scheduler {
                scheduler.start().await?;
            }
            ajh_web::serve_from_env().await?;
        }
        Commands::Digest { overrides } => {
            let config = PipelineConfig::from_env();
            let profile = load_overridden_profile(&config, &overrides)?;
            let Some(run_dir) = ajh_pipeline::latest_run_dir(&config.reports_dir)? else {
                anyhow::bail!("no runs found under {}", config.reports_dir.display());
            };
            let listings = ajh_pipeline::load_run_results(&run_dir)?;
            let selection = ajh_digest::select_for_digest(&listings, profile.min_score);
            let today = Utc::now().date_naive();
            let subject = ajh_digest::subject_line(selection.listings.len(), today);
            let html = ajh_digest::render_html(&selection, today);
            let preview = ajh_digest::write_preview(&run_dir, &html)?;
            println!("subject: {subject}");
            println!("preview: {}", preview.display());
        }
        Commands::Migrate => {
            let config = PipelineConfig::from_env();
            let Some(url) = config.database_url else {
                anyhow::bail!("DATABASE_URL is not set");
            };
            ResultsStore::connect(&url).await?;
            println!("migrations applied");
        }
        Commands::Report { runs } => {
            let config = PipelineConfig::from_env();
            let markdown = ajh_pipeline::report_daily_markdown(runs, &config.reports_dir)?;
            println!("{markdown}");
        }
    }

    Ok(())
}

fn load_overridden_profile(
    config: &PipelineConfig,
    overrides: &ProfileOverrides,
) -> Result<ajh_core::Profile> {
    let path = overrides
        .profile
        .as_deref()
        .unwrap_or(&config.profile_path);
    let mut profile = load_profile(path)?;
    if let Some(hours) = overrides.hours {
        profile.max_hours_since_posted = hours;
    }
    if let Some(location) = &overrides.location {
        profile.locations.insert(0, location.clone());
    }
    if let Some(min_score) = overrides.min_score {
        profile.min_score = min_score;
    }
    profile.validate()?;
    Ok(profile)
}

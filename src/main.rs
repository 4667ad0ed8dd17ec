//! CourseIntel: Course Intelligence Extraction & Reconciliation Engine

use anyhow::Result;
use clap::{Parser, Subcommand};
use courseintel::{
    config::{Config, LogFormat},
    extraction::ExtractionCoordinator,
    store::Store,
    types::CourseIdentity,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "courseintel")]
#[command(about = "Course intelligence extraction and reconciliation engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "courseintel.toml")]
    config: PathBuf,

    /// Data directory override
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full extraction for a course
    Extract {
        /// Path to a course identity JSON file
        course: PathBuf,
    },

    /// Show the persisted syllabus and assignments for a course
    Show {
        /// Course id
        course_id: Uuid,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show recent generative usage events
    Usage {
        /// Number of events
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Initialize a new configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }
    std::fs::create_dir_all(&config.store.data_dir)?;

    // -v flags override the configured level; RUST_LOG overrides both
    let level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false);
    match config.logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }

    match cli.command {
        Commands::Extract { course } => extract(config, course).await,
        Commands::Show { course_id, format } => show(config, course_id, format),
        Commands::Usage { limit } => usage(config, limit),
        Commands::Init { path } => init(path),
    }
}

async fn extract(config: Config, course_path: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&course_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read course file '{}': {}",
            course_path.display(),
            e
        )
    })?;
    let course: CourseIdentity = serde_json::from_str(&content).map_err(|e| {
        anyhow::anyhow!(
            "Failed to parse course file '{}': {}",
            course_path.display(),
            e
        )
    })?;

    let store = Arc::new(Store::open(&config.store.data_dir)?);
    let coordinator = ExtractionCoordinator::new(config, store);
    let report = coordinator.run(&course).await?;

    info!(
        "Done: {} schedule entries, {} resources, assignments {:?}",
        report.schedule_entries, report.resource_count, report.assignments
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn show(config: Config, course_id: Uuid, format: String) -> Result<()> {
    let store = Store::open(&config.store.data_dir)?;

    let Some(syllabus) = store.syllabus(&course_id)? else {
        anyhow::bail!("No syllabus stored for course {}", course_id);
    };
    let assignments = store.assignments(&course_id)?;
    let resources = store.resources(&course_id)?;

    if format == "json" {
        let out = serde_json::json!({
            "syllabus": syllabus,
            "assignments": assignments,
            "resources": resources,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Syllabus {} (updated {})", syllabus.id, syllabus.updated_at);
    if let Some(source) = &syllabus.source_url {
        println!("Source: {source}");
    }
    println!("\nSchedule ({} entries):", syllabus.schedule.len());
    for row in &syllabus.schedule {
        let date = row
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "          ".to_string());
        println!("  {date}  {}", row.title.as_deref().unwrap_or("(untitled)"));
    }
    println!("\nAssignments ({}):", assignments.len());
    for a in &assignments {
        let due = a
            .due_on
            .map(|d| format!(" due {d}"))
            .unwrap_or_default();
        println!("  [{}] {}{due}", a.kind.as_str(), a.label);
    }
    println!("\nResources ({}):", resources.len());
    for url in &resources {
        println!("  {url}");
    }
    Ok(())
}

fn usage(config: Config, limit: usize) -> Result<()> {
    let store = Store::open(&config.store.data_dir)?;
    for event in store.recent_usage(limit)? {
        println!(
            "{}  {}/{}  prompt={} completion={}  {}",
            event.recorded_at,
            event.provider,
            event.model,
            event.prompt_tokens,
            event.completion_tokens,
            event.feature
        );
    }
    Ok(())
}

fn init(path: PathBuf) -> Result<()> {
    let config_path = path.join("courseintel.toml");
    if config_path.exists() {
        anyhow::bail!("Refusing to overwrite {}", config_path.display());
    }

    let config = Config::default();
    std::fs::write(&config_path, config.to_toml()?)?;
    println!("Created configuration file: {}", config_path.display());

    std::fs::create_dir_all(&config.store.data_dir)?;
    println!("Created data directory: {}", config.store.data_dir.display());
    Ok(())
}

mod db;
mod error;
mod normalize;
mod pipeline;
mod record;
mod settings;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use settings::Settings;
use store::EntityStore;

#[derive(Parser)]
#[command(name = "film_processor", about = "Normalize scraped film pages into SQLite")]
struct Cli {
    /// Database file (overrides FILMDB_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Normalize a JSONL file of scraped pages and store it ("-" reads stdin)
    Load {
        input: PathBuf,
        /// Max input lines to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Print normalized records as JSON instead of storing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show row counts per table
    Stats,
}

impl Commands {
    /// `load --dry-run` prints records as JSON; status lines go to stderr.
    fn writes_records_to_stdout(&self) -> bool {
        matches!(self, Commands::Load { dry_run: true, .. })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let stdout_is_data = cli.command.writes_records_to_stdout();

    let mut settings = Settings::load()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.db_path, settings.busy_timeout())?;
            db::init_schema(&conn)?;
            println!("Schema ready at {}", settings.db_path.display());
            Ok(())
        }
        Commands::Load {
            input,
            limit,
            dry_run,
        } => {
            let reader = pipeline::open_input(&input)?;
            let opts = pipeline::LoadOptions {
                limit,
                batch_size: settings.batch_size,
                show_progress: !dry_run,
            };
            if dry_run {
                let stats = pipeline::run(reader, None, &opts)?;
                eprintln!(
                    "Dry run: {} records accepted, {} rejected, {} malformed lines.",
                    stats.accepted, stats.rejected, stats.malformed_lines
                );
                return Ok(());
            }

            let conn = db::connect(&settings.db_path, settings.busy_timeout())?;
            db::init_schema(&conn)?;
            let store = EntityStore::new(&conn);
            let stats = pipeline::run(reader, Some(&store), &opts)?;
            stats.print();
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path, settings.busy_timeout())?;
            db::init_schema(&conn)?;
            for c in db::table_counts(&conn)? {
                println!("{:<26} {:>8}", c.table, c.rows);
            }
            let s = db::films_summary(&conn)?;
            println!();
            println!("Films:             {}", s.total);
            println!("With release date: {}", s.with_release_date);
            println!("With box office:   {}", s.with_box_office);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        if stdout_is_data {
            eprintln!("\nDone in {}", format_duration(elapsed));
        } else {
            println!("\nDone in {}", format_duration(elapsed));
        }
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

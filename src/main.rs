mod db;
mod error;
mod library;
mod models;
mod scanner;
mod settings;
mod video;
mod watch;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use db::Database;
use library::{DirectoryRef, Library, Registration, VideoFilter};
use settings::{Settings, SettingsLayer};
use video::FfmpegBackend;

#[derive(Parser)]
#[command(name = "video-contact-indexer", version, about = "Index video folders into contact sheets")]
struct Cli {
    /// Directory holding the catalog database and generated images
    #[arg(long, global = true, env = "VCI_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// Root for screenshots and contact sheets
    #[arg(long, global = true, env = "VCI_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
    /// SQLite catalog file
    #[arg(long, global = true, env = "VCI_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a directory and index every video under it
    Add { dir: PathBuf },
    /// Reconcile a watched directory (path or id) with the filesystem
    Rescan { target: DirectoryRef },
    /// Stop watching a directory and delete its videos and images
    Remove { target: DirectoryRef },
    /// List watched directories
    Paths,
    /// List indexed videos ordered by file name
    List {
        #[arg(long)]
        favorites: bool,
        /// Only videos at or below this directory
        #[arg(long)]
        directory: Option<PathBuf>,
    },
    /// List the parent directories of indexed videos
    Directories,
    /// Toggle the favorite flag of a video
    Favorite { video_id: i64 },
    /// Rescan watched directories whenever their contents change
    Watch {
        #[arg(long, env = "VCI_WATCH_DEBOUNCE_MS")]
        debounce_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let debounce_ms = match &cli.command {
        Command::Watch { debounce_ms } => *debounce_ms,
        _ => None,
    };
    let settings = Settings::load(SettingsLayer {
        data_dir: cli.data_dir,
        database_path: cli.database,
        output_dir: cli.output_dir,
        log_filter: None,
        watch_debounce_ms: debounce_ms,
    })
    .context("failed to load settings")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)))
        .with_writer(std::io::stderr)
        .init();

    settings.ensure_dirs().context("failed to create data directories")?;
    let db = Database::open(&settings.database_path)
        .with_context(|| format!("failed to open {}", settings.database_path.display()))?;
    let mut library = Library::new(db, FfmpegBackend, settings.output_dir.clone())?;

    match cli.command {
        Command::Add { dir } => match library
            .register_directory(&dir)
            .with_context(|| format!("failed to add {}", dir.display()))?
        {
            Registration::Added { directory, summary } => {
                print_json(&directory)?;
                print_json(&summary)?;
            }
            Registration::AlreadyRegistered(directory) => {
                eprintln!("already watching {}", directory.directory_path.display());
            }
        },
        Command::Rescan { target } => {
            let (_, summary) = library.rescan_directory(&target).context("rescan failed")?;
            print_json(&summary)?;
        }
        Command::Remove { target } => {
            let summary = library.remove_directory(&target).context("remove failed")?;
            print_json(&summary)?;
        }
        Command::Paths => {
            for dir in library.directories()? {
                print_json(&dir)?;
            }
        }
        Command::List { favorites, directory } => {
            let filter = VideoFilter {
                favorites_only: favorites,
                directory: directory.map(|d| d.canonicalize().unwrap_or(d)),
            };
            for video in library.videos(&filter)? {
                print_json(&video)?;
            }
        }
        Command::Directories => {
            let mut out = std::io::stdout().lock();
            for dir in library.video_directories()? {
                writeln!(out, "{dir}")?;
            }
        }
        Command::Favorite { video_id } => {
            library.toggle_favorite(video_id)?;
            print_json(&library.video(video_id)?)?;
        }
        Command::Watch { .. } => {
            watch::watch_library(&mut library, Duration::from_millis(settings.watch_debounce_ms))
                .context("watch failed")?;
        }
    }

    Ok(())
}

/// Print one value as a JSON line on stdout
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

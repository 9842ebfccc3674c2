mod classify;
mod collector;
mod config;
mod db;
mod dedup;
mod discover;
mod error;
mod extract;
mod model;
mod paginate;
mod readiness;
mod render;
mod snapshot;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::collector::Collector;
use crate::config::{Settings, SinkKind};
use crate::model::Theme;
use crate::render::chromium::ChromiumFactory;
use crate::render::SessionFactory;
use crate::snapshot::{JsonSnapshot, SnapshotSink};

#[derive(Parser)]
#[command(name = "theme_collector", about = "Collects trending theme constituents from a rendered ranking page")]
struct Cli {
    /// Settings file (default: ./theme_collector.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover every theme and collect its listings
    Collect {
        /// Use a saved theme list instead of discovering
        #[arg(long)]
        themes_file: Option<PathBuf>,
        /// Categories collected at once
        #[arg(short, long)]
        workers: Option<usize>,
        /// Page cap per category
        #[arg(long)]
        max_pages: Option<u32>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List the themes on the landing page
    Discover {
        /// Save the list as JSON for `collect --themes-file`
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Collect a single theme by id
    Theme {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print a stored snapshot
    Show {
        #[command(flatten)]
        output: OutputArgs,
        /// Max themes to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Snapshot path (overrides the configured one)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Store the snapshot in SQLite instead of JSON
    #[arg(long)]
    sqlite: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if cli.headed {
        settings.browser.headless = false;
    }

    let result = match cli.command {
        Commands::Collect {
            themes_file,
            workers,
            max_pages,
            output,
        } => {
            if let Some(w) = workers {
                settings.collector.workers = w;
            }
            if let Some(m) = max_pages {
                settings.collector.max_pages = m;
            }
            let themes = themes_file.as_deref().map(read_themes).transpose()?;
            let mut sink = open_sink(&settings, &output)?;
            collect(settings, themes, sink.as_mut()).await
        }
        Commands::Discover { out } => {
            let factory = Arc::new(ChromiumFactory::launch(&settings.browser).await?);
            let collector = Collector::new(factory.clone(), settings);
            let themes = collector.discover().await;
            shutdown(factory.as_ref()).await;
            let themes = themes?;

            for (i, t) in themes.iter().enumerate() {
                println!("{:>3} | {:<8} | {}", i + 1, t.id, fit(&t.name, 40).trim_end());
            }
            println!("\n{} themes", themes.len());
            if let Some(path) = out {
                write_themes(&path, &themes)?;
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
        Commands::Theme { id, name, output } => {
            let mut sink = open_sink(&settings, &output)?;
            collect(settings, Some(vec![Theme { id, name }]), sink.as_mut()).await
        }
        Commands::Show { output, limit } => {
            let sink = open_sink(&settings, &output)?;
            let run = sink
                .load()
                .with_context(|| format!("reading snapshot {}", sink.describe()))?;
            if run.is_empty() {
                println!("Snapshot {} is empty.", sink.describe());
                return Ok(());
            }

            println!("{:>3} | {} | {:>5} | {}", "#", fit("Theme", 24), "Count", "First listings");
            println!("{}", "-".repeat(80));
            for (i, t) in run.themes().iter().take(limit).enumerate() {
                let first: Vec<&str> = t.stocks.iter().take(3).map(|s| s.name.as_str()).collect();
                println!(
                    "{:>3} | {} | {:>5} | {}",
                    i + 1,
                    fit(&t.theme_name, 24),
                    t.count,
                    fit(&first.join(", "), 40).trim_end()
                );
            }
            println!("\n{} themes | {} listings", run.len(), run.listing_count());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn collect(
    settings: Settings,
    themes: Option<Vec<Theme>>,
    sink: &mut dyn SnapshotSink,
) -> anyhow::Result<()> {
    let factory = Arc::new(ChromiumFactory::launch(&settings.browser).await?);
    let collector = Collector::new(factory.clone(), settings);

    let cancel = collector.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight writes");
            cancel.cancel();
        }
    });

    let summary = collector.run(themes, sink).await;
    shutdown(factory.as_ref()).await;

    let summary = summary?;
    summary.print();
    println!("Snapshot: {}", sink.describe());
    Ok(())
}

async fn shutdown(factory: &dyn SessionFactory) {
    if let Err(e) = factory.shutdown().await {
        warn!("Browser shutdown failed: {e:#}");
    }
}

fn open_sink(settings: &Settings, args: &OutputArgs) -> anyhow::Result<Box<dyn SnapshotSink>> {
    let kind = if args.sqlite {
        SinkKind::Sqlite
    } else {
        settings.output.sink
    };
    let sink: Box<dyn SnapshotSink> = match kind {
        SinkKind::Json => {
            let path = args.output.clone().unwrap_or_else(|| settings.output.json_path.clone());
            Box::new(JsonSnapshot::new(path))
        }
        SinkKind::Sqlite => {
            let path = args.output.clone().unwrap_or_else(|| settings.output.sqlite_path.clone());
            Box::new(db::SqliteSnapshot::open(path)?)
        }
    };
    info!("Snapshot sink: {}", sink.describe());
    Ok(sink)
}

fn read_themes(path: &Path) -> anyhow::Result<Vec<Theme>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading theme list {}", path.display()))?;
    let themes: Vec<Theme> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing theme list {}", path.display()))?;
    Ok(themes)
}

fn write_themes(path: &Path, themes: &[Theme]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(themes)?)
        .with_context(|| format!("writing theme list {}", path.display()))?;
    Ok(())
}

/// Terminal columns taken by `c`: Hangul and other wide CJK glyphs take two.
fn columns(c: char) -> usize {
    match c as u32 {
        0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFF00..=0xFF60 => 2,
        _ => 1,
    }
}

/// Cut `s` to at most `width` terminal columns (marking the cut with `..`)
/// and pad it so table columns line up with Korean names.
fn fit(s: &str, width: usize) -> String {
    let total: usize = s.chars().map(columns).sum();
    let mut out = String::new();
    let mut used = 0;
    if total <= width {
        out.push_str(s);
        used = total;
    } else {
        for c in s.chars() {
            if used + columns(c) + 2 > width {
                break;
            }
            used += columns(c);
            out.push(c);
        }
        out.push_str("..");
        used += 2;
    }
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));
    out
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

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use playbill_core::config::load_config;
use playbill_core::model::Sequence;
use playbill_rfc::rfc::recur::TimeZoneResolver;
use playbill_service::timeline::{TimelineWindow, resolve_timeline};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "playbill")]
#[command(about = "Resolve overlapping sequence schedules into a single timeline")]
struct Cli {
    /// JSON array of sequences; `-` reads stdin
    #[arg(short, long)]
    input: PathBuf,

    /// Start of the window (RFC 3339); defaults to now
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// End of the window (RFC 3339); defaults to the configured horizon
    #[arg(long)]
    until: Option<DateTime<Utc>>,

    /// Cap on occurrences pulled into the window
    #[arg(long)]
    max_occurrences: Option<usize>,

    /// Pretty-print the resolved timeline
    #[arg(long)]
    pretty: bool,
}

fn read_sequences(input: &Path) -> anyhow::Result<Vec<Sequence>> {
    let raw = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("reading {}", input.display()))?
    };

    serde_json::from_str(&raw).context("parsing sequences")
}

fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config()?;

    tracing::debug!(config = ?config, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    let sequences = read_sequences(&cli.input)?;

    let from = cli.from.unwrap_or_else(Utc::now);
    let mut window = TimelineWindow::from_settings(from, &config.timeline);
    if let Some(until) = cli.until {
        window.until = until;
    }
    if let Some(max_occurrences) = cli.max_occurrences {
        window = window.with_max_occurrences(max_occurrences);
    }

    let mut resolver = TimeZoneResolver::with_fallback(&config.timeline.default_tzid)
        .context("resolving default timezone")?;

    tracing::info!(
        sequences = sequences.len(),
        from = %window.from,
        until = %window.until,
        "Resolving timeline"
    );

    let timeline = resolve_timeline(&sequences, &window, &mut resolver)?;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&timeline)?
    } else {
        serde_json::to_string(&timeline)?
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;

    Ok(())
}

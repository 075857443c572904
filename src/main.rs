use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use trace_replay::otlp::load_trace_file;
use trace_replay::tree_builder::export_rendered;
use trace_replay::types::{time_point_to_utc_string, TimePoint};
use trace_replay::{NormalizationStatus, ReplayConfig, ReplaySession};

const USAGE: &str =
    "Usage: trace-replay <trace.json[.gz]> [--config <config.json>] [--unit <1-10>] [--at <time ms>]";

struct Args {
    trace_file: PathBuf,
    config_file: Option<PathBuf>,
    delay_unit: Option<u32>,
    at: Option<TimePoint>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let Some(trace_file) = args.get(1) else {
        bail!("{}", USAGE);
    };

    let mut parsed = Args {
        trace_file: PathBuf::from(trace_file),
        config_file: None,
        delay_unit: None,
        at: None,
    };

    let mut rest = args[2..].iter();
    while let Some(flag) = rest.next() {
        let value = rest
            .next()
            .with_context(|| format!("Missing value for {}\n{}", flag, USAGE))?;
        match flag.as_str() {
            "--config" => parsed.config_file = Some(PathBuf::from(value)),
            "--unit" => parsed.delay_unit = Some(value.parse().context("Invalid --unit")?),
            "--at" => parsed.at = Some(value.parse().context("Invalid --at")?),
            _ => bail!("Unknown flag {}\n{}", flag, USAGE),
        }
    }

    Ok(parsed)
}

fn main() -> Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;

    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    let mut config = match &args.config_file {
        Some(path) => ReplayConfig::load(path)?,
        None => ReplayConfig::default(),
    };
    if let Some(delay_unit) = args.delay_unit {
        config.delay_unit = delay_unit;
    }

    let tree = load_trace_file(&args.trace_file)?;
    let mut session = ReplaySession::new(tree, config)?;

    match session.status() {
        NormalizationStatus::Normalized(stats) => eprintln!(
            "Normalized {} calls ({} stretched, max end delay {})",
            stats.visited, stats.stretched, stats.max_end_delay
        ),
        NormalizationStatus::Degraded(cycle) => eprintln!("WARN: {}", cycle),
    }
    if let Some(timeline) = session.playback().timeline() {
        eprintln!(
            "Timeline: {} - {} ({:.3}ms)",
            time_point_to_utc_string(timeline.start),
            time_point_to_utc_string(timeline.end),
            timeline.length()
        );
    }

    match args.at {
        Some(at) => {
            session.scrub(at);
            println!("{}", serde_json::to_string_pretty(session.active_nodes())?);
        }
        None => {
            println!(
                "{}",
                serde_json::to_string_pretty(&export_rendered(session.tree()))?
            );
        }
    }

    Ok(())
}

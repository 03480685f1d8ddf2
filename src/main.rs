//! screencast-probe: print the encoder limits this device reports and the
//! encode format a capture of the given size would use.
//!
//! Usage: `screencast-probe [WIDTHxHEIGHT] [--config PATH] [--descriptor PATH]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use screencast_encoder::video::EncodeFormat;
use screencast_encoder::{plan, DeviceCapability, PlannedResolution, ScreencastConfig};

const DEFAULT_SIZE: (u32, u32) = (1080, 1920);

#[derive(Debug, Default)]
struct Args {
    size: Option<(u32, u32)>,
    config: Option<PathBuf>,
    descriptor: Option<PathBuf>,
}

#[derive(Serialize)]
struct ProbeReport {
    capability: DeviceCapability,
    planned: PlannedResolution,
    format: EncodeFormat,
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("Expected WIDTHxHEIGHT, got {:?}", value))?;
    let width: u32 = w.parse().with_context(|| format!("Invalid width {:?}", w))?;
    let height: u32 = h.parse().with_context(|| format!("Invalid height {:?}", h))?;
    if width == 0 || height == 0 {
        bail!("Capture size {}x{} has a zero edge", width, height);
    }
    Ok((width, height))
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args> {
    let mut args = Args::default();
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--config" => {
                let path = argv.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--descriptor" => {
                let path = argv.next().context("--descriptor needs a path")?;
                args.descriptor = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            size => {
                if args.size.is_some() {
                    bail!("Capture size given twice");
                }
                args.size = Some(parse_size(size)?);
            }
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let mut config = match &args.config {
        Some(path) => ScreencastConfig::load(path)?,
        None => ScreencastConfig::load_or_default(),
    };
    if let Some(descriptor) = args.descriptor {
        config.descriptor_path = descriptor;
    }

    let (width, height) = args.size.unwrap_or(DEFAULT_SIZE);
    info!("Probing {:?} encoder for a {}x{} capture", config.codec, width, height);

    let probe = config.probe(Arc::new(config.static_profiles()));
    let capability = probe.probe(config.codec);
    let planned = plan(width, height, &capability);
    let format = EncodeFormat::new(config.codec, &planned, &config.tuning);

    let report = ProbeReport {
        capability,
        planned,
        format,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize probe report")?
    );
    Ok(())
}

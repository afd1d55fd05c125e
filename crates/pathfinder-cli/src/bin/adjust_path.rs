//! Run one path adjustment on a JSON request.
//!
//! Prints the adjusted waypoint list as JSON on stdout, or `null` when the
//! original waypoints can be flown as they are. Logs go to stderr.

use anyhow::Context;
use clap::Parser;
use pathfinder_cli::Config;
use pathfinder_core::{adjust_path_async, AdjustPathRequest};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Adjust a waypoint path around obstacles
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Request JSON file, or `-` for stdin
    #[arg(default_value = "-")]
    request: PathBuf,

    /// Engine config JSON file (environment and flags override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Buffer around every obstacle in meters
    #[arg(long)]
    buffer: Option<f64>,

    /// Process-time budget in seconds
    #[arg(long)]
    max_process_time: Option<f64>,

    /// Vehicle turning radius in meters
    #[arg(long)]
    turning_radius: Option<f64>,

    /// Distance under which candidate nodes are merged, meters
    #[arg(long)]
    vertex_merge: Option<f64>,

    /// Skip virtual nodes on obstacle perimeters and flyzone corners
    #[arg(long)]
    no_virtualize: bool,

    /// Plan segments one after another
    #[arg(long)]
    sequential: bool,

    /// Pretty-print the result
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn read_request(path: &Path) -> anyhow::Result<AdjustPathRequest> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading request from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading request {}", path.display()))?
    };
    serde_json::from_str(&raw).context("parsing request JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(args.log_json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!args.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pathfinder=info".parse()?)
                .add_directive("adjust_path=info".parse()?),
        )
        .init();

    let mut engine = Config::load(args.config.as_deref())?.engine;
    if let Some(buffer) = args.buffer {
        engine.buffer_size_m = buffer;
    }
    if let Some(secs) = args.max_process_time {
        engine.max_process_time = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid --max-process-time {secs}"))?;
    }
    if let Some(radius) = args.turning_radius {
        engine.turning_radius_m = radius;
    }
    if let Some(threshold) = args.vertex_merge {
        engine.vertex_merge_threshold_m = threshold;
    }
    if args.no_virtualize {
        engine.virtualize_flyzone = false;
    }
    if args.sequential {
        engine.parallel_segments = false;
    }

    let request = read_request(&args.request)?;
    tracing::info!(
        waypoints = request.waypoints.len(),
        stationary = request.stationary_obstacles.len(),
        moving = request.moving_obstacles.len(),
        "adjusting path"
    );

    let result = adjust_path_async(request, engine).await?;
    let output = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{output}");
    Ok(())
}

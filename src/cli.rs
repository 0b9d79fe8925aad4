//! Command line arguments

use crate::timeline::hotspots::DEFAULT_TOP_N;
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "tracelens",
    about = "Interactive timeline viewer for execution traces",
    after_help = "\
EXAMPLES:
    tracelens                                  Built-in trace, seed 42
    tracelens --seed 7 --threads 8             Larger generated trace
    RUST_LOG=debug tracelens                   Log frame skips and resizes"
)]
pub struct Args {
    /// Seed for the built-in trace generator
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of threads (lanes) to generate
    #[arg(long, default_value = "4")]
    pub threads: u32,

    /// Total trace duration in milliseconds
    #[arg(long, value_name = "MS", default_value = "10000")]
    pub duration_ms: f64,

    /// Number of methods listed in the hotspot panel
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    pub hotspots: usize,

    /// Frame timer interval in milliseconds
    #[arg(long, value_name = "MS", default_value = "16")]
    pub frame_interval_ms: u64,

    /// Give up on a GPU frame after this many milliseconds
    #[arg(long, value_name = "MS", default_value = "2000")]
    pub fence_timeout_ms: u64,
}

const DEFAULT_DURATION_MS: f64 = 10_000.0;

/// Sanitised run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub seed: u64,
    pub threads: u32,
    pub duration_ms: f64,
    pub hotspots: usize,
    pub frame_interval: Duration,
    pub fence_timeout: Duration,
}

impl From<Args> for Settings {
    fn from(args: Args) -> Self {
        let duration_ms = if args.duration_ms.is_finite() && args.duration_ms > 0.0 {
            args.duration_ms
        } else {
            log::warn!(
                "Ignoring trace duration {}, using {DEFAULT_DURATION_MS}ms",
                args.duration_ms
            );
            DEFAULT_DURATION_MS
        };
        Self {
            seed: args.seed,
            threads: args.threads.max(1),
            duration_ms,
            hotspots: args.hotspots.max(1),
            frame_interval: Duration::from_millis(args.frame_interval_ms.max(1)),
            fence_timeout: Duration::from_millis(args.fence_timeout_ms.max(1)),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Args::parse_from(["tracelens"]).into()
    }
}

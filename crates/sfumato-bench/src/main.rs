//! sfumato-bench: CLI tool for timing filter sequences.
//!
//! Loads an image (or generates a synthetic one), applies a scripted
//! sequence of filter requests, and prints per-computation diagnostics.
//! Useful for:
//!
//! - Measuring blur cost across blur factors and image sizes
//! - Tuning `sigma_per_factor`
//! - Watching how a slider drag collapses under the worker's
//!   superseding policy (`--burst`)
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin sfumato-bench -- [OPTIONS] [IMAGE_PATH]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use sfumato_filter::{
    BlurFactor, Clock, FilterConfig, PixelBuffer, Request, Response, SessionDiagnostics,
};
use sfumato_host::FilterWorker;

/// Filter timing and diagnostics for sfumato.
///
/// Applies a sequence of blur / edge-detect / reset requests to an image
/// and prints how long each computation took.
#[derive(Parser)]
#[command(name = "sfumato-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP). A synthetic image
    /// is generated when omitted.
    image_path: Option<PathBuf>,

    /// Synthetic image pattern, used without an image path.
    #[arg(long, value_enum, default_value_t = Pattern::Checkerboard)]
    synthetic: Pattern,

    /// Synthetic image width.
    #[arg(long, default_value_t = 640, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    width: u32,

    /// Synthetic image height.
    #[arg(long, default_value_t = 480, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    height: u32,

    /// Comma-separated requests: `blur:<factor>`, `edge`, `reset`.
    #[arg(long, default_value = "blur:20,edge")]
    ops: String,

    /// Gaussian sigma per blur-factor step.
    #[arg(long, default_value_t = FilterConfig::DEFAULT_SIGMA_PER_FACTOR)]
    sigma_per_factor: f32,

    /// Full filter config as a JSON string.
    ///
    /// When provided, `--sigma-per-factor` is ignored.
    #[arg(long)]
    config_json: Option<String>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Instead of `--ops`, fire this many blur updates at a worker
    /// thread as fast as possible, sweeping the factor from 1 to 100.
    #[arg(long)]
    burst: Option<u32>,

    /// Write the last output image to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

/// Synthetic test image selection.
#[derive(Clone, Copy, ValueEnum)]
enum Pattern {
    /// 16-pixel black and white checkerboard.
    Checkerboard,
    /// Left half dark, right half light.
    Split,
}

fn config_from_cli(cli: &Cli) -> Result<FilterConfig, String> {
    let config = match cli.config_json {
        Some(ref json) => serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --config-json: {e}"))?,
        None => FilterConfig {
            sigma_per_factor: cli.sigma_per_factor,
        },
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn load_image(cli: &Cli) -> Result<PixelBuffer, String> {
    let Some(ref path) = cli.image_path else {
        return synthetic(cli.synthetic, cli.width, cli.height).map_err(|e| e.to_string());
    };
    let decoded = image::open(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    PixelBuffer::try_from(decoded.to_rgba8()).map_err(|e| e.to_string())
}

fn synthetic(
    pattern: Pattern,
    width: u32,
    height: u32,
) -> Result<PixelBuffer, sfumato_filter::FilterError> {
    match pattern {
        Pattern::Checkerboard => PixelBuffer::from_fn(width, height, |x, y| {
            if (x / 16 + y / 16) % 2 == 0 {
                [0, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            }
        }),
        Pattern::Split => PixelBuffer::from_fn(width, height, |x, _| {
            if x < width / 2 {
                [40, 60, 80, 255]
            } else {
                [220, 200, 180, 255]
            }
        }),
    }
}

/// Parse `blur:<factor>,edge,reset` into requests.
fn parse_ops(ops: &str) -> Result<Vec<Request>, String> {
    ops.split(',')
        .map(str::trim)
        .filter(|op| !op.is_empty())
        .map(|op| match op.split_once(':') {
            Some(("blur", factor)) => factor
                .trim()
                .parse()
                .map(|blur_factor| Request::Blur { blur_factor })
                .map_err(|e| format!("invalid blur factor in {op:?}: {e}")),
            None if op == "edge" => Ok(Request::EdgeDetect),
            None if op == "reset" => Ok(Request::Reset),
            _ => Err(format!("unknown op {op:?}")),
        })
        .collect()
}

fn init_request(image: &PixelBuffer) -> Request {
    Request::Init {
        pixel_bytes: image.as_bytes().to_vec(),
        width: image.width(),
        height: image.height(),
    }
}

fn last_output(responses: &[Response]) -> Option<&PixelBuffer> {
    responses
        .iter()
        .rev()
        .find_map(|r| r.as_result().map(|result| &result.output))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let image = match load_image(&cli) {
        Ok(image) => image,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Image: {}x{}", image.width(), image.height());
    log::debug!("config: {config:?}");

    if let Some(updates) = cli.burst {
        return run_burst(&cli, config, &image, updates);
    }

    let ops = match parse_ops(&cli.ops) {
        Ok(ops) => ops,
        Err(msg) => {
            eprintln!("Error parsing --ops: {msg}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let requests = std::iter::once(init_request(&image)).chain(ops.iter().cloned());
        let (responses, diagnostics) =
            sfumato_filter::process_all_with_diagnostics(config.clone(), requests, &StdClock);

        for response in &responses {
            if let Response::Error { error } = response {
                eprintln!("Filter error: {error}");
            }
        }
        if !print_diagnostics(&diagnostics, cli.json) {
            return ExitCode::FAILURE;
        }
        if run == 0
            && let Some(ref path) = cli.output
        {
            save_output(path, last_output(&responses));
        }

        all_diagnostics.push(diagnostics);
        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Simulate a slider drag against a worker thread.
fn run_burst(cli: &Cli, config: FilterConfig, image: &PixelBuffer, updates: u32) -> ExitCode {
    let worker = match FilterWorker::spawn(config) {
        Ok(worker) => worker,
        Err(e) => {
            eprintln!("Error starting worker: {e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("burst: {updates} blur updates on a worker thread");
    let started = Instant::now();
    let mut sent = Vec::with_capacity(usize::try_from(updates).unwrap_or_default() + 1);
    sent.push(init_request(image));
    sent.extend((0..updates).map(|i| Request::Blur {
        blur_factor: sweep_factor(i, updates),
    }));
    for request in sent {
        if let Err(e) = worker.send(request) {
            eprintln!("Error sending to worker: {e}");
            return ExitCode::FAILURE;
        }
    }

    let (diagnostics, responses) = match worker.shutdown() {
        Ok(done) => done,
        Err(e) => {
            eprintln!("Worker failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    let responses: Vec<Response> = responses.try_iter().collect();
    let elapsed = started.elapsed();
    log::debug!(
        "burst: {} superseded, {} computed",
        diagnostics.stats.superseded,
        diagnostics.stats.computed
    );

    if !print_diagnostics(&diagnostics, cli.json) {
        return ExitCode::FAILURE;
    }
    println!();
    println!(
        "Burst: {updates} updates -> {} results in {:.3}ms",
        responses.iter().filter(|r| r.as_result().is_some()).count(),
        elapsed.as_secs_f64() * 1000.0,
    );
    if let Some(ref path) = cli.output {
        save_output(path, last_output(&responses));
    }
    ExitCode::SUCCESS
}

/// Blur factor for update `i` of `updates`, sweeping evenly from the
/// minimum to the maximum.
fn sweep_factor(i: u32, updates: u32) -> u32 {
    let (min, max) = (BlurFactor::MIN.get(), BlurFactor::MAX.get());
    if updates <= 1 {
        return max;
    }
    let step = u64::from(i) * u64::from(max - min) / u64::from(updates - 1);
    min + u32::try_from(step).unwrap_or(max - min)
}

/// Print a session report. Returns `false` if JSON serialization failed.
fn print_diagnostics(diagnostics: &SessionDiagnostics, json: bool) -> bool {
    if !json {
        println!("{}", diagnostics.report());
        return true;
    }
    match serde_json::to_string_pretty(diagnostics) {
        Ok(json) => {
            println!("{json}");
            true
        }
        Err(e) => {
            eprintln!("Error serializing diagnostics: {e}");
            false
        }
    }
}

fn save_output(path: &std::path::Path, output: Option<&PixelBuffer>) {
    let Some(output) = output else {
        eprintln!("No filter output to write");
        return;
    };
    let rgba: image::RgbaImage = output.clone().into();
    match rgba.save(path) {
        Ok(()) => eprintln!("Output written to {}", path.display()),
        Err(e) => eprintln!("Error writing {}: {e}", path.display()),
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[SessionDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration().as_secs_f64() * 1000.0)
        .collect();
    if durations.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;
    println!("Total compute: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-step means; every run applies the same ops in the same order.
    println!();
    println!("{:<4} {:<18} {:>12}", "#", "Operation", "Mean (ms)");
    println!("{}", "-".repeat(40));
    let steps = all_diagnostics
        .iter()
        .map(|d| d.computations.len())
        .min()
        .unwrap_or(0);
    for step in 0..steps {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.computations[step].duration.as_secs_f64() * 1000.0)
            .sum();
        let op = all_diagnostics[0].computations[step].op;
        println!(
            "{:<4} {:<18} {:>10.3}ms",
            step + 1,
            op.to_string(),
            total / all_diagnostics.len() as f64,
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_op_list() {
        let ops = parse_ops("blur:20, edge ,reset,blur:3").unwrap();
        assert_eq!(
            ops,
            vec![
                Request::Blur { blur_factor: 20 },
                Request::EdgeDetect,
                Request::Reset,
                Request::Blur { blur_factor: 3 },
            ]
        );
    }

    #[test]
    fn rejects_unknown_op_and_bad_factor() {
        assert!(parse_ops("sharpen").is_err());
        assert!(parse_ops("blur:lots").is_err());
        assert!(parse_ops("edge:1").is_err());
    }

    #[test]
    fn empty_op_list_is_empty() {
        assert!(parse_ops("").unwrap().is_empty());
    }

    #[test]
    fn sweep_covers_full_range() {
        assert_eq!(sweep_factor(0, 10), 1);
        assert_eq!(sweep_factor(9, 10), 100);
        assert_eq!(sweep_factor(0, 1), 100);
        let factors: Vec<u32> = (0..50).map(|i| sweep_factor(i, 50)).collect();
        assert!(factors.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn synthetic_patterns_have_requested_size() {
        for pattern in [Pattern::Checkerboard, Pattern::Split] {
            let image = synthetic(pattern, 33, 17).unwrap();
            assert_eq!((image.width(), image.height()), (33, 17));
        }
    }
}

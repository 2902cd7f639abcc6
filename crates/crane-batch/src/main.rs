// Batch driver for the crane simulation core.
//
// Runs N independent seeded runs across worker threads. Each worker owns its
// own driver; nothing is shared between runs except the read-only config and
// assets. One JSON report per run is written to the output directory.
//
// Usage:
//   crane-batch [OPTIONS]
//     --count <N>          Number of runs (default: 1)
//     --seed <S>           Seed of the first run; run i uses S + i (default: 0)
//     --threads <T>        Worker threads (default: available parallelism)
//     --config <FILE>      JSON config overriding the defaults
//     --out <DIR>          Output directory (default: output)
//     --perfect-stack      Centre the crane and drop straight down

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use crane_sim::prelude::*;

struct BatchArgs {
    count: u64,
    seed: u64,
    threads: usize,
    config: Option<PathBuf>,
    out: PathBuf,
    perfect_stack: bool,
}

impl Default for BatchArgs {
    fn default() -> Self {
        Self {
            count: 1,
            seed: 0,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            config: None,
            out: PathBuf::from("output"),
            perfect_stack: false,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();

    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimConfig::default(),
    };
    if args.perfect_stack {
        config.perfect_stack = true;
    }
    config.validate().context("invalid configuration")?;
    let assets = StaticAssets::from_config(&config).context("resolving block assets")?;

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;

    let threads = args.threads.clamp(1, args.count.max(1) as usize);
    tracing::info!(count = args.count, seed = args.seed, threads, "starting batch");

    let next = AtomicU64::new(0);
    let results: Vec<Result<Vec<RunOutcome>>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| scope.spawn(|| worker(&next, &args, &config, &assets)))
            .collect();
        workers
            .into_iter()
            .map(|w| {
                w.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("worker thread panicked")))
            })
            .collect()
    });

    let mut victories = 0;
    let mut fails = 0;
    for result in results {
        for outcome in result? {
            match outcome {
                RunOutcome::Victory => victories += 1,
                RunOutcome::Fail => fails += 1,
                RunOutcome::Pending => {}
            }
        }
    }

    tracing::info!(victories, fails, out = %args.out.display(), "batch complete");
    Ok(())
}

/// Claim run indices until none are left.
fn worker(
    next: &AtomicU64,
    args: &BatchArgs,
    config: &SimConfig,
    assets: &StaticAssets,
) -> Result<Vec<RunOutcome>> {
    let mut outcomes = Vec::new();
    loop {
        let index = next.fetch_add(1, Ordering::Relaxed);
        if index >= args.count {
            return Ok(outcomes);
        }
        let seed = args.seed.wrapping_add(index);

        let mut driver = SimulationDriver::new(config, assets, seed);
        let mut sink = CountingSink::default();
        let report = driver.run(&mut sink);
        tracing::info!(
            index,
            seed,
            outcome = ?report.outcome,
            finish_time = ?report.finish_time,
            frames = sink.frames,
            "run finished"
        );

        write_report(&args.out, index, &report)?;
        outcomes.push(report.outcome);
    }
}

fn write_report(dir: &Path, index: u64, report: &RunReport) -> Result<()> {
    let path = dir.join(format!("run_{index}.json"));
    let json = serde_json::to_string_pretty(report).context("serializing run report")?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
fn parse_args() -> BatchArgs {
    let mut parsed = BatchArgs::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--count" => {
                i += 1;
                parsed.count = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--count requires a valid number");
                    std::process::exit(1);
                });
            }
            "--seed" => {
                i += 1;
                parsed.seed = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--seed requires a valid number");
                    std::process::exit(1);
                });
            }
            "--threads" => {
                i += 1;
                parsed.threads = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--threads requires a valid number");
                    std::process::exit(1);
                });
            }
            "--config" => {
                i += 1;
                parsed.config = Some(args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("--config requires a path");
                    std::process::exit(1);
                }));
            }
            "--out" => {
                i += 1;
                parsed.out = args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("--out requires a path");
                    std::process::exit(1);
                });
            }
            "--perfect-stack" => parsed.perfect_stack = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_usage() {
    println!("Usage: crane-batch [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --count <N>          Number of runs (default: 1)");
    println!("  --seed <S>           Seed of the first run; run i uses S + i (default: 0)");
    println!("  --threads <T>        Worker threads (default: available parallelism)");
    println!("  --config <FILE>      JSON config overriding the defaults");
    println!("  --out <DIR>          Output directory (default: output)");
    println!("  --perfect-stack      Centre the crane and drop straight down");
    println!("  --help, -h           Show this help");
}

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::Rng;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slidegate::{Admission, Decision, LimiterConfig, Locking};

#[derive(Parser, Debug)]
#[command(
    name = "slidegate",
    version,
    about = "Drive a per-key sliding-window rate limiter"
)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one key per line from stdin and print each decision
    Replay {
        #[command(flatten)]
        limiter: LimiterArgs,
    },
    /// Hammer the limiter from concurrent callers and report totals
    Stress {
        #[command(flatten)]
        limiter: LimiterArgs,

        /// Number of concurrent callers
        #[arg(long, default_value_t = 8)]
        callers: usize,

        /// Number of distinct keys to spread calls over
        #[arg(long, default_value_t = 16)]
        keys: usize,

        /// Calls made by each caller
        #[arg(long, default_value_t = 10_000)]
        rounds: usize,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct LimiterArgs {
    /// YAML limiter configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured limit
    #[arg(long)]
    limit: Option<usize>,

    /// Override the configured window, in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Override the configured locking strategy
    #[arg(long, value_enum)]
    locking: Option<LockingArg>,

    /// Refuse a zero limit or zero window
    #[arg(long)]
    strict: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LockingArg {
    Sharded,
    Global,
}

impl From<LockingArg> for Locking {
    fn from(arg: LockingArg) -> Self {
        match arg {
            LockingArg::Sharded => Locking::Sharded,
            LockingArg::Global => Locking::Global,
        }
    }
}

impl LimiterArgs {
    fn load(&self) -> anyhow::Result<LimiterConfig> {
        let mut config = match &self.config {
            Some(path) => LimiterConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => LimiterConfig::default(),
        };

        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Some(window_ms) = self.window_ms {
            config.window_ms = window_ms;
        }
        if let Some(locking) = self.locking {
            config.locking = locking.into();
        }
        config.strict |= self.strict;

        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct StressSummary {
    callers: usize,
    keys: usize,
    rounds: usize,
    completed: u64,
    admitted: u64,
    rejected: u64,
    failed_callers: usize,
    elapsed_ms: u128,
    calls_per_sec: f64,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReplaySummary {
    admitted: u64,
    rejected: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Replay { limiter } => {
            let limiter = limiter.load()?.build()?;
            let stdin = BufReader::new(tokio::io::stdin());
            let summary = replay(limiter.as_ref(), stdin, &mut std::io::stdout()).await?;
            info!(
                admitted = summary.admitted,
                rejected = summary.rejected,
                keys = limiter.key_count(),
                "Replay finished"
            );
            Ok(())
        }
        Command::Stress {
            limiter,
            callers,
            keys,
            rounds,
            json,
        } => {
            let config = limiter.load()?;
            let summary = stress(Arc::from(config.build()?), callers, keys, rounds).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "completed={} admitted={} rejected={} failed_callers={} elapsed={}ms rate={:.0}/s",
                    summary.completed,
                    summary.admitted,
                    summary.rejected,
                    summary.failed_callers,
                    summary.elapsed_ms,
                    summary.calls_per_sec
                );
            }
            Ok(())
        }
    }
}

/// Decide for every non-blank line of `input`, writing one result line each.
async fn replay<R, W>(
    limiter: &dyn Admission,
    input: R,
    out: &mut W,
) -> anyhow::Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut summary = ReplaySummary::default();

    while let Some(line) = lines.next_line().await? {
        let key = line.trim();
        if key.is_empty() {
            continue;
        }
        match limiter.check(key) {
            Decision::Allowed => {
                summary.admitted += 1;
                writeln!(out, "{}\tallow", key)?;
            }
            Decision::Rejected {
                retry_after: Some(wait),
            } => {
                summary.rejected += 1;
                writeln!(out, "{}\tdeny\tretry_after_ms={}", key, wait.as_millis())?;
            }
            Decision::Rejected { retry_after: None } => {
                summary.rejected += 1;
                writeln!(out, "{}\tdeny\tretry_after=never", key)?;
            }
        }
    }

    out.flush()?;
    Ok(summary)
}

async fn stress(
    limiter: Arc<dyn Admission>,
    callers: usize,
    keys: usize,
    rounds: usize,
) -> anyhow::Result<StressSummary> {
    if keys == 0 {
        anyhow::bail!("--keys must be at least 1");
    }
    let Some(planned) = callers.checked_mul(rounds) else {
        anyhow::bail!("--callers {} x --rounds {} overflows", callers, rounds);
    };

    info!(callers, keys, rounds, planned, "Starting stress run");
    let started = Instant::now();

    let mut tasks = JoinSet::new();
    for _ in 0..callers {
        let limiter = limiter.clone();
        tasks.spawn_blocking(move || {
            let mut rng = rand::thread_rng();
            let mut admitted = 0u64;
            for _ in 0..rounds {
                let key = format!("key-{}", rng.gen_range(0..keys));
                if limiter.allow(&key) {
                    admitted += 1;
                }
            }
            (rounds as u64, admitted)
        });
    }

    let (mut completed, mut admitted, mut failed_callers) = (0u64, 0u64, 0usize);
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok((calls, granted)) => {
                completed += calls;
                admitted += granted;
            }
            Err(e) => {
                failed_callers += 1;
                warn!(error = %e, "Stress caller failed");
            }
        }
    }

    let elapsed = started.elapsed();
    Ok(StressSummary {
        callers,
        keys,
        rounds,
        completed,
        admitted,
        rejected: completed - admitted,
        failed_callers,
        elapsed_ms: elapsed.as_millis(),
        calls_per_sec: completed as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidegate::SlidingWindowLimiter;
    use std::time::Duration;

    #[tokio::test]
    async fn test_replay_writes_one_line_per_key() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let input: &[u8] = b"a\nb\n\n  \na\nb\n";
        let mut out = Vec::new();

        let summary = replay(&limiter, input, &mut out).await.unwrap();
        assert_eq!(
            summary,
            ReplaySummary {
                admitted: 2,
                rejected: 2
            }
        );

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "a\tallow");
        assert_eq!(lines[1], "b\tallow");
        assert!(lines[2].starts_with("a\tdeny\tretry_after_ms="));
        assert!(lines[3].starts_with("b\tdeny\tretry_after_ms="));
    }

    #[tokio::test]
    async fn test_replay_zero_limit_never_suggests_retry() {
        let limiter = SlidingWindowLimiter::new(0, Duration::from_secs(1));
        let input: &[u8] = b"a\na\n";
        let mut out = Vec::new();

        replay(&limiter, input, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "a\tdeny\tretry_after=never\na\tdeny\tretry_after=never\n");
    }

    #[tokio::test]
    async fn test_stress_single_key_admits_limit() {
        let limiter: Arc<dyn Admission> =
            Arc::new(SlidingWindowLimiter::new(5, Duration::from_secs(60)));

        let summary = stress(limiter, 4, 1, 100).await.unwrap();
        assert_eq!(summary.completed, 400);
        assert_eq!(summary.admitted, 5);
        assert_eq!(summary.rejected, 395);
        assert_eq!(summary.failed_callers, 0);
    }

    #[tokio::test]
    async fn test_stress_rejects_overflowing_plan() {
        let limiter: Arc<dyn Admission> =
            Arc::new(SlidingWindowLimiter::new(5, Duration::from_secs(60)));

        assert!(stress(limiter.clone(), usize::MAX, 1, 2).await.is_err());
        assert!(stress(limiter, 1, 0, 1).await.is_err());
    }
}

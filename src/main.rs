use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use barstack::decor::{decorator, merge, Decorator, Statistics, WidthConfig};
use barstack::{BarOptions, Progress, Settings, SpinnerAlignment};

#[derive(Parser, Debug)]
#[command(name = "barstack")]
#[command(about = "Demo of stacked progress bars with aligned columns")]
struct Args {
    /// Number of concurrently advancing bars
    #[arg(short, long, default_value = "4")]
    bars: usize,

    /// Steps per bar
    #[arg(short, long, default_value = "120")]
    total: u64,

    /// Settings file (TOML). BARSTACK_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to this file (stdout belongs to the bars)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.log_file {
        init_logging(path)?;
    }
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args, settings))
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("barstack=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Steps per second since the bar started.
struct Rate {
    wc: WidthConfig,
}

impl Decorator for Rate {
    fn decor(&self, stats: &Statistics) -> String {
        let secs = stats.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return "-".to_string();
        }
        format!("{:.1}/s", stats.current as f64 / secs)
    }

    fn config(&self) -> WidthConfig {
        self.wc
    }
}

async fn run(args: Args, settings: Settings) -> Result<()> {
    let progress = settings.apply(Progress::builder())?.build();
    let shut_down = || anyhow::anyhow!("Progress container shut down");

    // The label spans the name and counter columns of the bars below it. Its
    // extra space stands in for the one after the counters.
    let header = progress
        .add_spinner(
            args.total * args.bars as u64,
            SpinnerAlignment::Middle,
            BarOptions::new()
                .priority(-1)
                .width(40)
                .prepend(merge::merge(
                    decorator::name("all jobs", WidthConfig::synced_left().with_extra_space()),
                    vec![WidthConfig::synced().with_extra_space()],
                ))
                .append(decorator::on_complete(
                    decorator::percentage(WidthConfig::synced()),
                    "done",
                )),
        )
        .await
        .ok_or_else(shut_down)?;

    let mut jobs = Vec::with_capacity(args.bars);
    for i in 0..args.bars {
        let bar = progress
            .add_bar(
                args.total,
                BarOptions::new()
                    .width(40)
                    .prepend(decorator::name(format!("job #{i}"), WidthConfig::synced_left()))
                    .prepend(decorator::counters(WidthConfig::synced().with_extra_space()))
                    .append(decorator::on_complete(
                        decorator::percentage(WidthConfig::synced()),
                        "done",
                    ))
                    .append(Box::new(Rate {
                        wc: WidthConfig::synced().with_extra_space(),
                    })),
            )
            .await
            .ok_or_else(shut_down)?;
        jobs.push(bar);
    }

    let last = jobs.last().cloned().context("At least one bar is required")?;
    let cleanup = progress
        .add_bar(
            (args.total / 2).max(1),
            BarOptions::new()
                .park_behind(&last)
                .remove_on_complete()
                .width(40)
                .prepend(decorator::name("cleanup", WidthConfig::synced_left()))
                .prepend(decorator::counters(WidthConfig::synced().with_extra_space()))
                .append(decorator::elapsed(WidthConfig::synced())),
        )
        .await
        .ok_or_else(shut_down)?;

    for (i, bar) in jobs.into_iter().enumerate() {
        let header = header.clone();
        let delay = Duration::from_millis(15 + 10 * i as u64);
        tokio::spawn(async move {
            while !bar.is_complete() {
                tokio::time::sleep(delay).await;
                bar.increment();
                header.increment();
            }
        });
    }
    tokio::spawn(async move {
        last.wait_retired().await;
        while !cleanup.is_complete() {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cleanup.increment();
        }
    });

    progress.wait().await;
    info!("all bars finished");
    Ok(())
}

use pledge_ledger::{Aggregator, Amount, FileStore, LedgerConfig, LedgerStore,
    MalformedPolicy, Progress};

use std::{path::PathBuf, thread, time::Duration};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

#[derive(Parser, Debug)]
#[clap(version, about, propagate_version = true)]
struct Cli {
    /// Path to a TOML config file
    #[clap(short, long, env = "PLEDGE_CONFIG", value_parser)]
    config: Option<PathBuf>,

    /// Pledge directory, overrides the configured one
    #[clap(short, long, env = "PLEDGE_DIR", value_parser)]
    dir: Option<PathBuf>,

    /// Leave malformed records out of totals and listings instead of failing
    #[clap(long)]
    skip_malformed: bool,

    /// Action to perform
    #[clap(subcommand)]
    action: Subcommands,
}

#[derive(Debug, Subcommand)]
enum Subcommands {
    /// Record a new pledge
    Append(Append),
    /// Print the current total
    Total,
    /// List all pledges
    List(List),
    /// Show the total against the goal
    Progress,
    /// Keep re-reading the total and print progress
    Watch(Watch),
}

#[derive(Args, Debug)]
struct Append {
    /// Name or contact address of the supporter
    #[clap(value_parser)]
    identity: String,

    #[clap(value_parser)]
    amount: Amount,
}

#[derive(Args, Debug)]
struct List {
    /// Print records as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct Watch {
    /// Seconds between reads, defaults to the configured refresh
    #[clap(short, long, value_parser)]
    interval: Option<u64>,

    /// Stop after this many reads
    #[clap(short, long, value_parser)]
    ticks: Option<u64>,
}

const BAR_WIDTH: usize = 30;

fn progress_line(progress: &Progress, currency: &str) -> String {
    let filled = progress.filled(BAR_WIDTH);
    let bar = format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled));
    let bar = if progress.is_reached() { bar.green() } else { bar.magenta() };
    format!("[{}] {}{} / {}{} ({:.1}%)",
        bar, progress.total, currency, progress.goal, currency, progress.percent())
}

fn load_config(cli: &Cli) -> anyhow::Result<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::read(path)
            .with_context(|| format!("while loading {}", path.display()))?,
        None => LedgerConfig::default()
    };
    if let Some(dir) = &cli.dir {
        config.storage.dir = dir.clone();
    }
    if cli.skip_malformed {
        config.aggregation.on_malformed = MalformedPolicy::SkipAndLog;
    }
    return Ok(config);
}

impl Watch {
    fn run(&self, store: &FileStore, config: &LedgerConfig) {
        let aggregator = Aggregator::with_policy(store, config.aggregation.on_malformed);
        let interval = Duration::from_secs(self.interval.unwrap_or(config.display.refresh_secs));
        let mut last = Amount::ZERO;
        let mut tick = 0;

        loop {
            match aggregator.total() {
                Ok(total) => last = total,
                Err(err) => log::error!("keeping last total, read failed: {}", err)
            }
            let progress = Progress::new(last, config.display.goal);
            println!("{} {}",
                chrono::Local::now().format("%H:%M:%S").to_string().dimmed(),
                progress_line(&progress, &config.display.currency));

            tick += 1;
            if self.ticks.is_some_and(|ticks| tick >= ticks) {
                break;
            }
            thread::sleep(interval);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env().init();

    let args = Cli::parse();
    let config = load_config(&args)?;
    let store = config.open_store();
    let aggregator = Aggregator::with_policy(&store, config.aggregation.on_malformed);
    let currency = &config.display.currency;

    match &args.action {
        Subcommands::Append(append) => {
            let sequence = store.append(&append.identity, append.amount)
                .with_context(|| "pledge was not recorded")?;
            let total = aggregator.total()?;
            println!("Recorded pledge #{} ({}{})", sequence, append.amount, currency);
            println!("{}: {}{}", "Total".bold(), total, currency);
        },
        Subcommands::Total => {
            println!("{}{}", aggregator.total()?, currency);
        },
        Subcommands::List(list) => {
            let records = aggregator.records()?;
            if list.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    println!("{}{}", record, currency);
                }
            }
        },
        Subcommands::Progress => {
            let summary = aggregator.summary()?;
            let progress = Progress::new(summary.total, config.display.goal);
            println!("{}", progress_line(&progress, currency));
            if summary.skipped > 0 {
                println!("{}", format!("{} malformed record(s) left out", summary.skipped).bright_red());
            }
        },
        Subcommands::Watch(watch) => {
            watch.run(&store, &config);
        }
    }

    Ok(())
}

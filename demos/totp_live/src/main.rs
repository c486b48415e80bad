use std::time::Duration;

use clap::Parser;
use localtotp::{
    time_source::{TimeApiConfig, TimeMode, DEFAULT_TIME_API},
    uri_helper::{config_from_uri, config_to_uri, ShareLink},
    DisplayScheduler, DisplaySink, OtpHashAlgorithm, Recomputation, SyncError, TimeSource,
    TimeSourceKind, Totp,
};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(about = "Shows the current and next TOTP code, refreshed every second")]
struct Args {
    /// Base32 secret
    #[arg(long, default_value = "")]
    secret: String,

    #[arg(long, default_value_t = 6)]
    digits: u32,

    /// Period in seconds
    #[arg(long, default_value_t = 30)]
    period: u64,

    /// SHA1, SHA256 or SHA512
    #[arg(long, default_value_t = OtpHashAlgorithm::SHA1)]
    algorithm: OtpHashAlgorithm,

    /// Offset the device clock by a one-off fetch of online time
    #[arg(long)]
    online: bool,

    /// Read the whole configuration from a share link instead
    #[arg(long, conflicts_with_all = ["secret", "digits", "period", "algorithm", "online"])]
    link: Option<String>,

    /// Stop after this many refreshes
    #[arg(long)]
    ticks: Option<usize>,

    #[arg(long, default_value = DEFAULT_TIME_API)]
    time_api: Url,

    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Base of the share link printed on exit
    #[arg(long, default_value = "https://totp.localhost/")]
    share_base: String,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn share_link(&self) -> anyhow::Result<ShareLink> {
        if let Some(uri) = &self.link {
            return Ok(config_from_uri(uri)?);
        }

        let mut totp = Totp::new(self.secret.trim().to_string());
        totp.with_digits(self.digits)
            .with_period(self.period)
            .with_algorithm(self.algorithm);

        let time_source = if self.online {
            TimeSourceKind::Online
        } else {
            TimeSourceKind::Device
        };

        Ok(ShareLink { totp, time_source })
    }
}

struct TerminalSink {
    shown: mpsc::UnboundedSender<()>,
}

impl DisplaySink for TerminalSink {
    fn show(&mut self, update: Recomputation) {
        match update {
            Recomputation::NoSecret => println!("------   Next: ------   Valid for --s"),
            Recomputation::Failed(e) => println!("Error    Next: Error    Valid for --s   ({e})"),
            Recomputation::Codes(pair) => println!(
                "{}   Next: {}   Valid for {}s",
                pair.current, pair.next, pair.seconds_remaining
            ),
        }

        let _ = self.shown.send(());
    }

    fn source_settled(&mut self, kind: TimeSourceKind, outcome: &Result<(), SyncError>) {
        match (kind, outcome) {
            (_, Err(SyncError::Superseded)) => (),
            (TimeSourceKind::Device, _) => println!("Using device time"),
            (TimeSourceKind::Online, Ok(())) => println!("Using online time"),
            (TimeSourceKind::Online, Err(e)) => {
                println!("Failed to fetch online time ({e}). Using device time.")
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let link = args.share_link()?;
    if !link.totp.is_default_profile() {
        println!(
            "{} digits, {}s period, {}",
            link.totp.digits(),
            link.totp.period(),
            link.totp.algorithm()
        );
    }

    let time_source = TimeSource::system(&TimeApiConfig {
        endpoint: args.time_api.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    })?;

    let (config_tx, config_rx) = watch::channel(link.totp.clone());
    let (selection_tx, selection_rx) = mpsc::channel(4);
    let (shown_tx, mut shown_rx) = mpsc::unbounded_channel();

    let scheduler = DisplayScheduler::new(
        time_source.clone(),
        config_rx,
        selection_rx,
        TerminalSink { shown: shown_tx },
    );
    let handle = tokio::spawn(scheduler.run());

    if link.time_source == TimeSourceKind::Online {
        selection_tx.send(TimeSourceKind::Online).await?;
    }

    let mut refreshes = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = shown_rx.recv() => {
                if received.is_none() {
                    break;
                }
                refreshes += 1;
                if args.ticks.is_some_and(|ticks| refreshes >= ticks) {
                    break;
                }
            }
        }
    }

    let time_source = match time_source.mode() {
        TimeMode::Synced { .. } => TimeSourceKind::Online,
        TimeMode::Device => TimeSourceKind::Device,
    };
    let current = ShareLink {
        totp: config_tx.borrow().clone(),
        time_source,
    };

    drop(config_tx);
    handle.await?;
    info!(refreshes, "Display stopped");

    println!("Share link: {}", config_to_uri(&args.share_base, &current)?);

    Ok(())
}

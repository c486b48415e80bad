//! Periodic refresh of the displayed codes.
//!
//! The scheduler owns the 1 Hz tick. It recomputes once on start, on every tick,
//! on every configuration change and as soon as a time source switch settles.
//! A failed recomputation is reported and the loop carries on.

use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{CodePair, OtpError, SyncError, TimeSource, TimeSourceKind, Totp};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Outcome of one recomputation, handed to the display
#[derive(Debug)]
pub enum Recomputation {
    /// No secret entered yet
    NoSecret,
    Failed(OtpError),
    Codes(CodePair),
}

/// Renders what the scheduler computes
pub trait DisplaySink: Send {
    fn show(&mut self, update: Recomputation);

    /// Called once a time source selection has settled, before the recomputation it triggers
    fn source_settled(&mut self, _kind: TimeSourceKind, _outcome: &Result<(), SyncError>) {}
}

type Settled = (TimeSourceKind, Result<(), SyncError>);

pub struct DisplayScheduler<S> {
    time_source: TimeSource,
    config: watch::Receiver<Totp>,
    selections: mpsc::Receiver<TimeSourceKind>,
    sink: S,
}

impl<S: DisplaySink> DisplayScheduler<S> {
    pub fn new(
        time_source: TimeSource,
        config: watch::Receiver<Totp>,
        selections: mpsc::Receiver<TimeSourceKind>,
        sink: S,
    ) -> Self {
        Self {
            time_source,
            config,
            selections,
            sink,
        }
    }

    /// Computes the codes for the current configuration and instant
    pub fn recompute(&self) -> Recomputation {
        let now = self.time_source.now();

        match self.config.borrow().code_pair_at(now) {
            Ok(Some(pair)) => Recomputation::Codes(pair),
            Ok(None) => Recomputation::NoSecret,
            Err(e) => {
                debug!(error = %e, "Failed to generate TOTP");
                Recomputation::Failed(e)
            }
        }
    }

    /// Runs until the configuration sender is dropped, then hands the sink back
    pub async fn run(mut self) -> S {
        let (settled_tx, mut settled_rx) = mpsc::unbounded_channel::<Settled>();

        // The first tick completes immediately
        let mut ticker = time::interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = self.config.changed() => {
                    if changed.is_err() {
                        debug!("Configuration closed, stopping display");
                        break;
                    }
                    self.refresh();
                }
                Some(kind) = self.selections.recv() => self.select_source(kind, &settled_tx),
                Some((kind, outcome)) = settled_rx.recv() => {
                    self.sink.source_settled(kind, &outcome);
                    self.refresh();
                }
                _ = ticker.tick() => self.refresh(),
            }
        }

        self.sink
    }

    fn refresh(&mut self) {
        let update = self.recompute();
        self.sink.show(update);
    }

    fn select_source(&mut self, kind: TimeSourceKind, settled: &mpsc::UnboundedSender<Settled>) {
        info!(source = %kind, "Time source selected");

        match kind {
            TimeSourceKind::Device => {
                self.time_source.use_device();
                self.sink.source_settled(kind, &Ok(()));
                self.refresh();
            }
            TimeSourceKind::Online => {
                let time_source = self.time_source.clone();
                let settled = settled.clone();

                tokio::spawn(async move {
                    let outcome = time_source.sync().await;
                    // The scheduler may already be gone
                    let _ = settled.send((kind, outcome));
                });
            }
        }
    }
}

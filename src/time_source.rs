//! Where "now" comes from.
//!
//! The device clock is always available. Switching to online time performs a
//! single fetch against a remote time authority and keeps the difference to the
//! device clock as a fixed offset until the source changes again. The offset is
//! never re-corrected in the background.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::OtpError;

pub const DEFAULT_TIME_API: &str = "https://www.timeapi.io/api/Time/current/zone?timeZone=UTC";
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Time request failed")]
    Request(#[from] reqwest::Error),
    #[error("Time authority answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("Malformed time response")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("Time response holds an impossible timestamp")]
    InvalidTimestamp,
    #[error("A newer time source selection settled first")]
    Superseded,
}

/// The source selected by the user
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TimeSourceKind {
    #[default]
    Device,
    Online,
}

impl Display for TimeSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Online => write!(f, "online"),
        }
    }
}

impl FromStr for TimeSourceKind {
    type Err = OtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "device" => Ok(Self::Device),
            "online" => Ok(Self::Online),
            _ => Err(OtpError::InvalidTimeSource(s.to_string())),
        }
    }
}

/// The state `now()` is computed from
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    #[default]
    Device,
    Synced { offset_ms: i64 },
}

impl TimeMode {
    pub fn offset_ms(&self) -> i64 {
        match self {
            Self::Device => 0,
            Self::Synced { offset_ms } => *offset_ms,
        }
    }
}

/// The local clock, in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A remote clock that can be asked for the current time once
#[async_trait]
pub trait TimeAuthority: Send + Sync {
    async fn fetch_ms(&self) -> Result<i64, SyncError>;
}

#[derive(Debug, Clone)]
pub struct TimeApiConfig {
    pub endpoint: Url,
    pub timeout: Duration,
}

impl Default for TimeApiConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_TIME_API).expect("default time API URL is valid"),
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

/// UTC calendar fields as served by TimeAPI.io
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarTime {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    #[serde(alias = "second")]
    seconds: u32,
    #[serde(alias = "millisecond")]
    milli_seconds: u32,
}

impl CalendarTime {
    fn epoch_ms(&self) -> Result<i64, SyncError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|date| {
                date.and_hms_milli_opt(self.hour, self.minute, self.seconds, self.milli_seconds)
            })
            .map(|datetime| datetime.and_utc().timestamp_millis())
            .ok_or(SyncError::InvalidTimestamp)
    }
}

/// Parses a time authority response body into milliseconds since the epoch
pub fn parse_time_response(body: &str) -> Result<i64, SyncError> {
    let time: CalendarTime = serde_json::from_str(body)?;

    time.epoch_ms()
}

/// HTTPS time authority answering with UTC calendar fields
pub struct TimeApi {
    client: reqwest::Client,
    endpoint: Url,
}

impl TimeApi {
    pub fn new(config: &TimeApiConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl TimeAuthority for TimeApi {
    async fn fetch_ms(&self) -> Result<i64, SyncError> {
        let resp = self.client.get(self.endpoint.clone()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status(status));
        }

        let body = resp.text().await?;
        parse_time_response(&body)
    }
}

#[derive(Debug, Default)]
struct SourceState {
    mode: TimeMode,
    // Bumped by every selection so a stale sync cannot publish over a newer one
    generation: u64,
}

/// Supplies the current instant, either straight from the device clock or shifted
/// by the offset measured during the last successful [`sync`](Self::sync).
///
/// Clones share the same state.
#[derive(Clone)]
pub struct TimeSource {
    state: Arc<Mutex<SourceState>>,
    clock: Arc<dyn Clock>,
    authority: Arc<dyn TimeAuthority>,
}

impl TimeSource {
    pub fn new(clock: Arc<dyn Clock>, authority: Arc<dyn TimeAuthority>) -> Self {
        Self {
            state: Arc::default(),
            clock,
            authority,
        }
    }

    /// Device clock plus the TimeAPI.io authority
    pub fn system(config: &TimeApiConfig) -> Result<Self, SyncError> {
        Ok(Self::new(
            Arc::new(SystemClock),
            Arc::new(TimeApi::new(config)?),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Milliseconds since the epoch according to the current mode. Never waits on a sync.
    pub fn now(&self) -> i64 {
        let offset_ms = self.lock().mode.offset_ms();

        self.clock.now_ms().saturating_add(offset_ms)
    }

    pub fn mode(&self) -> TimeMode {
        self.lock().mode
    }

    pub fn offset_ms(&self) -> i64 {
        self.lock().mode.offset_ms()
    }

    /// Drops any offset and invalidates syncs still in flight
    pub fn use_device(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.mode = TimeMode::Device;

        info!("Using device time");
    }

    /// Measures the offset to the remote authority once.
    ///
    /// Device time is served while the request is outstanding. The outcome is only
    /// published if no later `sync` or [`use_device`](Self::use_device) was issued
    /// in the meantime, otherwise [`SyncError::Superseded`] is returned and the state
    /// is left alone.
    pub async fn sync(&self) -> Result<(), SyncError> {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.mode = TimeMode::Device;
            state.generation
        };

        debug!(generation, "Fetching online time");
        let fetched = self
            .authority
            .fetch_ms()
            .await
            .map(|remote_ms| remote_ms - self.clock.now_ms());

        let mut state = self.lock();
        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                "Discarding superseded time sync"
            );
            return Err(SyncError::Superseded);
        }

        match fetched {
            Ok(offset_ms) => {
                state.mode = TimeMode::Synced { offset_ms };
                info!(offset_ms, "Using online time");
                Ok(())
            }
            Err(e) => {
                state.mode = TimeMode::Device;
                warn!(error = %e, "Failed to fetch online time, using device time");
                Err(e)
            }
        }
    }
}

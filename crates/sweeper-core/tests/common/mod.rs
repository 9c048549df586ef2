//! Shared test fixtures: a scripted gateway over the in-memory store.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rand::Rng;

use sweeper_core::domain::{EntryId, Fields, IdRange, PendingRecord, PendingSummary, StreamEntry};
use sweeper_core::error::GatewayError;
use sweeper_core::impls::InMemoryStreamStore;
use sweeper_core::ports::{FixedClock, StreamGateway};
use sweeper_core::{SweepConfig, Sweeper};

pub const STREAM: &str = "tweets_stream";
pub const GROUP: &str = "group1";
pub const RECOVERY: &str = "monitoring-consumer";
pub const MIN_IDLE: Duration = Duration::from_secs(60);

/// One call made through the gateway, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PendingSummary,
    PendingDetails { limit: usize },
    Claim { ids: Vec<EntryId> },
    Write { key: String },
    Ack { id: EntryId },
}

#[derive(Debug, Default)]
struct Faults {
    scan: Option<GatewayError>,
    claim: Option<GatewayError>,
    write_keys: HashSet<String>,
    hang_write_keys: HashSet<String>,
    panic_write_keys: HashSet<String>,
    empty_details: bool,
    ack_ids: HashSet<EntryId>,
    extra_claimed: Vec<StreamEntry>,
}

/// Wraps [`InMemoryStreamStore`], recording calls and injecting faults.
pub struct ScriptedGateway {
    pub store: InMemoryStreamStore,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<Call>>,
    max_jitter: Option<Duration>,
    writes_in_flight: AtomicUsize,
    peak_writes_in_flight: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(store: InMemoryStreamStore) -> Self {
        Self {
            store,
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(Vec::new()),
            max_jitter: None,
            writes_in_flight: AtomicUsize::new(0),
            peak_writes_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every write and ack by a random duration up to `max`.
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.max_jitter = Some(max);
        self
    }

    pub fn fail_scan(&self, err: GatewayError) {
        self.faults.lock().unwrap().scan = Some(err);
    }

    pub fn fail_claim(&self, err: GatewayError) {
        self.faults.lock().unwrap().claim = Some(err);
    }

    pub fn fail_write(&self, key: &str) {
        self.faults.lock().unwrap().write_keys.insert(key.to_string());
    }

    pub fn hang_write(&self, key: &str) {
        self.faults.lock().unwrap().hang_write_keys.insert(key.to_string());
    }

    pub fn panic_write(&self, key: &str) {
        self.faults.lock().unwrap().panic_write_keys.insert(key.to_string());
    }

    /// The detail query finds nothing, as if every entry was acked right
    /// after the summary was read.
    pub fn empty_details(&self) {
        self.faults.lock().unwrap().empty_details = true;
    }

    pub fn fail_ack(&self, id: EntryId) {
        self.faults.lock().unwrap().ack_ids.insert(id);
    }

    /// Extra entries the claim reply will (wrongly) include.
    pub fn claim_also_returns(&self, entries: Vec<StreamEntry>) {
        self.faults.lock().unwrap().extra_claimed = entries;
    }

    pub fn clear_faults(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn acked(&self) -> Vec<EntryId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Ack { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write { key } => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn peak_writes_in_flight(&self) -> usize {
        self.peak_writes_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn jitter(&self) {
        let Some(max) = self.max_jitter else {
            return;
        };
        let micros = rand::thread_rng().gen_range(0..=max.as_micros() as u64);
        tokio::time::sleep(Duration::from_micros(micros)).await;
    }
}

#[async_trait]
impl StreamGateway for ScriptedGateway {
    async fn pending_summary(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<PendingSummary, GatewayError> {
        self.record(Call::PendingSummary);
        let fault = self.faults.lock().unwrap().scan.clone();
        if let Some(err) = fault {
            return Err(err);
        }
        self.store.pending_summary(stream, group).await
    }

    async fn pending_details(
        &self,
        stream: &str,
        group: &str,
        range: IdRange,
        limit: usize,
    ) -> Result<Vec<PendingRecord>, GatewayError> {
        self.record(Call::PendingDetails { limit });
        let empty = self.faults.lock().unwrap().empty_details;
        if empty {
            return Ok(Vec::new());
        }
        self.store.pending_details(stream, group, range, limit).await
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        self.record(Call::Claim { ids: ids.to_vec() });
        let (fault, extra) = {
            let faults = self.faults.lock().unwrap();
            (faults.claim.clone(), faults.extra_claimed.clone())
        };
        if let Some(err) = fault {
            return Err(err);
        }
        let mut claimed = self.store.claim(stream, group, consumer, min_idle, ids).await?;
        claimed.extend(extra);
        Ok(claimed)
    }

    async fn write_index_record(&self, key: &str, fields: &Fields) -> Result<(), GatewayError> {
        self.record(Call::Write {
            key: key.to_string(),
        });
        let in_flight = self.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_writes_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        self.jitter().await;
        let (fail, hang, panics) = {
            let faults = self.faults.lock().unwrap();
            (
                faults.write_keys.contains(key),
                faults.hang_write_keys.contains(key),
                faults.panic_write_keys.contains(key),
            )
        };
        if panics {
            self.writes_in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("index writer crashed on {key}");
        }
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let result = if fail {
            Err(GatewayError::Command(format!("OOM writing {key}")))
        } else {
            self.store.write_index_record(key, fields).await
        };

        self.writes_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        id: EntryId,
    ) -> Result<(), GatewayError> {
        self.record(Call::Ack { id });
        self.jitter().await;
        let fail = self.faults.lock().unwrap().ack_ids.contains(&id);
        if fail {
            return Err(GatewayError::Unavailable("connection reset".to_string()));
        }
        self.store.acknowledge(stream, group, id).await
    }
}

pub fn noon() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ))
}

pub fn tweet(id: &str) -> Fields {
    Fields::from([
        ("id".to_string(), id.to_string()),
        ("user".to_string(), "ferris".to_string()),
        ("text".to_string(), format!("tweet number {id}")),
        ("hashtags".to_string(), "rust,streams".to_string()),
    ])
}

/// A stream where `stale` entries were delivered long ago and `fresh` ones
/// just now. Returns their ids, stale first.
pub async fn seed(
    store: &InMemoryStreamStore,
    clock: &FixedClock,
    stale: usize,
    fresh: usize,
) -> (Vec<EntryId>, Vec<EntryId>) {
    store.create_group(STREAM, GROUP).await.unwrap();

    let mut stale_ids = Vec::with_capacity(stale);
    for n in 0..stale {
        stale_ids.push(store.append(STREAM, tweet(&format!("s{n}"))).await);
    }
    store.read_group(STREAM, GROUP, "worker-1", stale).await.unwrap();
    clock.advance(MIN_IDLE * 2);

    let mut fresh_ids = Vec::with_capacity(fresh);
    for n in 0..fresh {
        fresh_ids.push(store.append(STREAM, tweet(&format!("f{n}"))).await);
    }
    store.read_group(STREAM, GROUP, "worker-2", fresh).await.unwrap();
    clock.advance(Duration::from_secs(1));

    (stale_ids, fresh_ids)
}

pub fn config() -> SweepConfig {
    SweepConfig::new(STREAM, GROUP, RECOVERY, MIN_IDLE)
}

pub fn sweeper(gateway: Arc<ScriptedGateway>, config: SweepConfig) -> Sweeper {
    Sweeper::builder(config).gateway(gateway).build().unwrap()
}

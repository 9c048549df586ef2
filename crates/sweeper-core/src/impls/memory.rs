//! In-memory stream store.
//!
//! Append-only streams with consumer groups, a pending-entry list per group
//! and a hash-per-key side-index. The claim/ack/pending semantics follow the
//! stream store the sweeper runs against in production, so the whole pass can
//! be exercised without a server.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{EntryId, Fields, IdRange, PendingRecord, PendingSummary, StreamEntry};
use crate::error::GatewayError;
use crate::ports::{Clock, StreamGateway, SystemClock};

/// Delivery state of one pending entry.
#[derive(Debug, Clone)]
struct PendingState {
    consumer: String,
    delivered_at: DateTime<Utc>,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Last entry handed out by `read_group`.
    last_delivered: Option<EntryId>,

    /// Delivered but not acknowledged.
    pending: BTreeMap<EntryId, PendingState>,
}

#[derive(Debug, Default)]
struct StreamLog {
    entries: BTreeMap<EntryId, Fields>,
    last_id: Option<EntryId>,
    groups: HashMap<String, GroupState>,
}

impl StreamLog {
    /// Next id: clock millis, or `last + 1 seq` if the clock has not moved.
    fn next_id(&self, now_ms: u64) -> EntryId {
        match self.last_id {
            Some(last) if now_ms <= last.millis() => EntryId::new(last.millis(), last.seq() + 1),
            _ => EntryId::new(now_ms, 0),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    streams: HashMap<String, StreamLog>,
    index: HashMap<String, Fields>,
}

impl StoreState {
    fn group_mut(&mut self, stream: &str, group: &str) -> Result<&mut GroupState, GatewayError> {
        self.streams
            .get_mut(stream)
            .and_then(|log| log.groups.get_mut(group))
            .ok_or_else(|| no_group(stream, group))
    }

    fn group(&self, stream: &str, group: &str) -> Result<&GroupState, GatewayError> {
        self.streams
            .get(stream)
            .and_then(|log| log.groups.get(group))
            .ok_or_else(|| no_group(stream, group))
    }
}

fn no_group(stream: &str, group: &str) -> GatewayError {
    GatewayError::Command(format!(
        "NOGROUP No such key '{stream}' or consumer group '{group}'"
    ))
}

fn idle_since(now: DateTime<Utc>, delivered_at: DateTime<Utc>) -> Duration {
    (now - delivered_at).to_std().unwrap_or(Duration::ZERO)
}

/// In-memory [`StreamGateway`].
///
/// Cloning shares the underlying store.
#[derive(Clone)]
pub struct InMemoryStreamStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStreamStore {
    /// SystemClock を使う空の store を作成
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Idle durations and entry ids are computed from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock,
        }
    }

    /// Appends an entry, creating the stream if needed.
    pub async fn append(&self, stream: &str, fields: Fields) -> EntryId {
        let now_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let mut state = self.state.lock().await;
        let log = state.streams.entry(stream.to_string()).or_default();
        let id = log.next_id(now_ms);
        log.entries.insert(id, fields);
        log.last_id = Some(id);
        id
    }

    /// Creates `group` reading from the start of `stream` (creating the
    /// stream if needed).
    pub async fn create_group(&self, stream: &str, group: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        let log = state.streams.entry(stream.to_string()).or_default();
        if log.groups.contains_key(group) {
            return Err(GatewayError::Command(
                "BUSYGROUP Consumer Group name already exists".to_string(),
            ));
        }
        log.groups.insert(group.to_string(), GroupState::default());
        Ok(())
    }

    /// Delivers up to `count` entries not yet delivered to `group`, making
    /// `consumer` their owner.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let log = state
            .streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let group_state = log
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        let delivered: Vec<StreamEntry> = log
            .entries
            .iter()
            .filter(|(id, _)| group_state.last_delivered.is_none_or(|last| **id > last))
            .take(count)
            .map(|(id, fields)| StreamEntry::new(*id, fields.clone()))
            .collect();

        for entry in &delivered {
            group_state.pending.insert(
                entry.id(),
                PendingState {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
            group_state.last_delivered = Some(entry.id());
        }
        Ok(delivered)
    }

    /// Removes an entry from the stream. Pending records for it stay until
    /// the next claim drops them.
    pub async fn delete_entry(&self, stream: &str, id: EntryId) -> bool {
        let mut state = self.state.lock().await;
        state
            .streams
            .get_mut(stream)
            .is_some_and(|log| log.entries.remove(&id).is_some())
    }

    /// Current side-index record under `key`.
    pub async fn index_record(&self, key: &str) -> Option<Fields> {
        self.state.lock().await.index.get(key).cloned()
    }

    /// side-index のレコード数
    pub async fn index_len(&self) -> usize {
        self.state.lock().await.index.len()
    }

    /// Owner of a pending entry, if it is pending.
    pub async fn pending_owner(&self, stream: &str, group: &str, id: EntryId) -> Option<String> {
        let state = self.state.lock().await;
        let group_state = state.group(stream, group).ok()?;
        group_state.pending.get(&id).map(|p| p.consumer.clone())
    }
}

#[async_trait]
impl StreamGateway for InMemoryStreamStore {
    async fn pending_summary(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<PendingSummary, GatewayError> {
        let state = self.state.lock().await;
        let group_state = state.group(stream, group)?;
        Ok(PendingSummary {
            count: group_state.pending.len(),
        })
    }

    async fn pending_details(
        &self,
        stream: &str,
        group: &str,
        range: IdRange,
        limit: usize,
    ) -> Result<Vec<PendingRecord>, GatewayError> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        let group_state = state.group(stream, group)?;
        Ok(group_state
            .pending
            .iter()
            .filter(|(id, _)| range.contains(**id))
            .take(limit)
            .map(|(id, p)| PendingRecord {
                id: *id,
                consumer: p.consumer.clone(),
                idle: idle_since(now, p.delivered_at),
                delivery_count: p.delivery_count,
            })
            .collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let log = state
            .streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let group_state = log
            .groups
            .get_mut(group)
            .ok_or_else(|| no_group(stream, group))?;

        let mut claimed = Vec::new();
        for id in ids {
            let Some(pending) = group_state.pending.get_mut(id) else {
                continue;
            };
            if idle_since(now, pending.delivered_at) < min_idle {
                continue;
            }
            let Some(fields) = log.entries.get(id) else {
                // 削除済みのエントリは PEL からも外す
                group_state.pending.remove(id);
                continue;
            };
            pending.consumer = consumer.to_string();
            pending.delivered_at = now;
            pending.delivery_count += 1;
            claimed.push(StreamEntry::new(*id, fields.clone()));
        }
        Ok(claimed)
    }

    async fn write_index_record(&self, key: &str, fields: &Fields) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state
            .index
            .entry(key.to_string())
            .or_default()
            .merge(fields);
        Ok(())
    }

    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        id: EntryId,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.group_mut(stream, group)?.pending.remove(&id);
        Ok(())
    }
}

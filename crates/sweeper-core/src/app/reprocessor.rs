//! Reprocessor - claim したエントリの再処理
//!
//! 1 エントリ = 1 タスク。各タスクは index 書き込み → ack の順で進み、
//! 書き込みに失敗したエントリは ack しない（次回の pass で再度 pending として見える）。
//!
//! # 並行性
//! - fan-out: JoinSet に全タスクを spawn、Semaphore で同時実行数を制限
//! - fan-in: 各タスクの結果をこのループで集計（タスク間で共有するカウンタはない）
//! - pass の deadline を過ぎたら残りのタスクを abort し、`Aborted` として数える
//!   （abort 時点で終わっていたタスクは結果どおりに数える）

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{Instrument, debug, warn};

use crate::domain::{EntryId, IndexKeyPolicy, ReprocessOutcome, StreamEntry};
use crate::error::EntryError;
use crate::ports::StreamGateway;

/// Outcomes of one reprocess run.
#[derive(Debug, Clone, Default)]
pub struct ReprocessReport {
    /// One outcome per claimed entry.
    pub outcomes: Vec<ReprocessOutcome>,

    /// From the first spawn until the last task was collected.
    pub elapsed: Duration,
}

impl ReprocessReport {
    /// 書き込みと ack の両方に成功した件数
    pub fn processed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }
}

/// claim したエントリを並行に再処理する
///
/// 同時実行数は `max_in_flight`（0 は 1 として扱う）。
pub struct Reprocessor {
    gateway: Arc<dyn StreamGateway>,
    stream: Arc<str>,
    group: Arc<str>,
    index_key: Arc<IndexKeyPolicy>,
    max_in_flight: usize,
    call_timeout: Duration,
}

impl Reprocessor {
    /// 新しい Reprocessor を作成
    pub fn new(
        gateway: Arc<dyn StreamGateway>,
        stream: &str,
        group: &str,
        index_key: IndexKeyPolicy,
        max_in_flight: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            stream: Arc::from(stream),
            group: Arc::from(group),
            index_key: Arc::new(index_key),
            max_in_flight: max_in_flight.max(1),
            call_timeout,
        }
    }

    /// 全エントリを書き込み → ack し、すべて終わるか deadline まで待つ
    pub async fn reprocess(&self, entries: Vec<StreamEntry>, deadline: Instant) -> ReprocessReport {
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut fan_in = FanIn::with_capacity(entries.len());

        for entry in entries {
            let entry_id = entry.id();
            let job = EntryJob {
                gateway: Arc::clone(&self.gateway),
                stream: Arc::clone(&self.stream),
                group: Arc::clone(&self.group),
                index_key: Arc::clone(&self.index_key),
                call_timeout: self.call_timeout,
            };
            let permits = Arc::clone(&permits);
            fan_in.spawn(entry_id, async move {
                // semaphore は close しないので Err にはならない
                let _permit = permits.acquire_owned().await;
                job.run(entry).await
            });
        }

        if timeout_at(deadline, fan_in.collect_all()).await.is_err() {
            warn!(
                outstanding = fan_in.outstanding(),
                "pass deadline reached; aborting outstanding reprocess tasks"
            );
            fan_in.abort_and_drain().await;
        }

        ReprocessReport {
            outcomes: fan_in.into_outcomes(),
            elapsed: started.elapsed(),
        }
    }
}

/// fan-in 側の状態。タスクとそれが担当するエントリの対応を持つ。
struct FanIn {
    tasks: JoinSet<ReprocessOutcome>,
    owners: HashMap<tokio::task::Id, EntryId>,
    outcomes: Vec<ReprocessOutcome>,
}

impl FanIn {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            owners: HashMap::with_capacity(capacity),
            outcomes: Vec::with_capacity(capacity),
        }
    }

    fn spawn<F>(&mut self, entry_id: EntryId, task: F)
    where
        F: Future<Output = ReprocessOutcome> + Send + 'static,
    {
        let handle = self.tasks.spawn(task.in_current_span());
        self.owners.insert(handle.id(), entry_id);
    }

    fn outstanding(&self) -> usize {
        self.owners.len()
    }

    async fn collect_all(&mut self) {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.settle(joined);
        }
    }

    /// 残りを abort してから回収する。abort 前に終わっていたタスクの結果はそのまま使う。
    async fn abort_and_drain(&mut self) {
        self.tasks.abort_all();
        self.collect_all().await;
        // 回収できなかったものは Aborted
        let leftover = self.owners.drain().map(|(_, entry_id)| entry_id);
        self.outcomes
            .extend(leftover.map(ReprocessOutcome::aborted));
    }

    fn settle(&mut self, joined: Result<(tokio::task::Id, ReprocessOutcome), JoinError>) {
        match joined {
            Ok((task_id, outcome)) => {
                self.owners.remove(&task_id);
                self.outcomes.push(outcome);
            }
            Err(err) => {
                let Some(entry_id) = self.owners.remove(&err.id()) else {
                    warn!(error = %err, "reprocess task failed for an unknown entry");
                    return;
                };
                if err.is_panic() {
                    warn!(%entry_id, error = %err, "reprocess task panicked");
                } else {
                    debug!(%entry_id, "reprocess task cancelled");
                }
                self.outcomes.push(ReprocessOutcome::aborted(entry_id));
            }
        }
    }

    fn into_outcomes(self) -> Vec<ReprocessOutcome> {
        self.outcomes
    }
}

/// Everything one task needs; owned so the task is `'static`.
struct EntryJob {
    gateway: Arc<dyn StreamGateway>,
    stream: Arc<str>,
    group: Arc<str>,
    index_key: Arc<IndexKeyPolicy>,
    call_timeout: Duration,
}

impl EntryJob {
    async fn run(self, entry: StreamEntry) -> ReprocessOutcome {
        let entry_id = entry.id();
        match self.write_then_ack(&entry).await {
            Ok(key) => {
                debug!(%entry_id, %key, "entry reprocessed");
                ReprocessOutcome::processed(entry_id)
            }
            Err(err) => {
                warn!(%entry_id, error = %err, "entry left pending");
                ReprocessOutcome::failed(entry_id, &err)
            }
        }
    }

    async fn write_then_ack(&self, entry: &StreamEntry) -> Result<String, EntryError> {
        let key = self.index_key.key_for(entry)?;

        timeout(
            self.call_timeout,
            self.gateway.write_index_record(&key, entry.fields()),
        )
        .await
        .map_err(|_| EntryError::WriteTimeout(self.call_timeout))?
        .map_err(EntryError::Write)?;

        // write が成功したときだけここに来る
        timeout(
            self.call_timeout,
            self.gateway.acknowledge(&self.stream, &self.group, entry.id()),
        )
        .await
        .map_err(|_| EntryError::AckTimeout(self.call_timeout))?
        .map_err(EntryError::Ack)?;

        Ok(key)
    }
}

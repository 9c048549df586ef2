mod common;

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use sweeper_core::domain::{IndexKeyPolicy, ProcessResult, StreamEntry};
use sweeper_core::error::{GatewayError, Stage, SweepError};
use sweeper_core::impls::InMemoryStreamStore;

use common::*;

fn gateway_with(store: InMemoryStreamStore) -> Arc<ScriptedGateway> {
    Arc::new(ScriptedGateway::new(store))
}

fn assert_bounds(result: &ProcessResult) {
    assert!(result.processed <= result.claimed, "{result:?}");
    assert!(result.claimed <= result.pending, "{result:?}");
}

#[tokio::test]
async fn nothing_pending_returns_zero_result_without_claiming() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    store.create_group(STREAM, GROUP).await.unwrap();
    let gateway = gateway_with(store);

    let result = sweeper(gateway.clone(), config()).run_pass().await.unwrap();

    assert_eq!(result, ProcessResult::empty());
    assert_eq!(gateway.calls(), vec![Call::PendingSummary]);
}

#[tokio::test]
async fn entries_acked_between_summary_and_details_end_the_pass() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 3, 0).await;
    let gateway = gateway_with(store);
    gateway.empty_details();

    let result = sweeper(gateway.clone(), config()).run_pass().await.unwrap();

    assert_eq!(result, ProcessResult::empty());
    assert_eq!(
        gateway.calls(),
        vec![Call::PendingSummary, Call::PendingDetails { limit: 3 }]
    );
}

#[tokio::test]
async fn nothing_idle_enough_reports_pending_only() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 0, 4).await;
    let gateway = gateway_with(store);

    let result = sweeper(gateway.clone(), config()).run_pass().await.unwrap();

    assert_eq!(result, ProcessResult::pending_only(4));
    assert!(gateway.writes().is_empty());
    assert!(gateway.acked().is_empty());
    // 所有者はそのまま
    let calls = gateway.calls();
    assert!(matches!(calls.last(), Some(Call::Claim { ids }) if ids.len() == 4));
}

#[tokio::test]
async fn two_of_five_idle_are_claimed_and_processed() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    let (stale, fresh) = seed(&store, &clock, 2, 3).await;
    let gateway = gateway_with(store.clone());

    let result = sweeper(gateway.clone(), config()).run_pass().await.unwrap();

    assert_eq!(
        (result.pending, result.claimed, result.processed),
        (5, 2, 2)
    );
    assert!(result.time_taken_secs >= 0.0);
    assert_bounds(&result);

    let mut acked = gateway.acked();
    acked.sort();
    assert_eq!(acked, stale);

    assert_eq!(store.index_record("tweet:s0").await.unwrap(), tweet("s0"));
    assert_eq!(store.index_record("tweet:s1").await.unwrap(), tweet("s1"));
    assert_eq!(store.index_len().await, 2);

    for id in fresh {
        assert_eq!(store.pending_owner(STREAM, GROUP, id).await.as_deref(), Some("worker-2"));
    }
}

#[tokio::test]
async fn failed_write_is_never_acknowledged() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    let (stale, _fresh) = seed(&store, &clock, 2, 3).await;
    let gateway = gateway_with(store.clone());
    gateway.fail_write("tweet:s1");

    let result = sweeper(gateway.clone(), config()).run_pass().await.unwrap();

    assert_eq!(
        (result.pending, result.claimed, result.processed),
        (5, 2, 1)
    );
    assert_eq!(gateway.acked(), vec![stale[0]]);
    assert!(store.index_record("tweet:s1").await.is_none());
    // 失敗したエントリは recovery consumer の下で pending のまま
    assert_eq!(
        store.pending_owner(STREAM, GROUP, stale[1]).await.as_deref(),
        Some(RECOVERY)
    );
}

#[tokio::test]
async fn every_ack_follows_its_own_write() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 6, 0).await;
    let gateway = gateway_with(store);
    gateway.fail_write("tweet:s2");
    gateway.fail_write("tweet:s4");

    sweeper(gateway.clone(), config()).run_pass().await.unwrap();

    let calls = gateway.calls();
    for (pos, call) in calls.iter().enumerate() {
        if let Call::Ack { id } = call {
            let key = format!("tweet:s{}", id.seq());
            let written_before = calls[..pos]
                .iter()
                .any(|c| matches!(c, Call::Write { key: k } if *k == key));
            assert!(written_before, "ack for {id} issued before its write");
        }
    }
    assert_eq!(gateway.acked().len(), 4);
}

#[tokio::test]
async fn claim_failure_is_a_pass_error() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 3, 0).await;
    let gateway = gateway_with(store);
    gateway.fail_claim(GatewayError::Command("WRONGTYPE".into()));

    let err = sweeper(gateway.clone(), config()).run_pass().await.unwrap_err();

    assert_eq!(err, SweepError::ClaimFailure("WRONGTYPE".into()));
    assert!(gateway.writes().is_empty());
    assert!(gateway.acked().is_empty());
}

#[rstest]
#[case::command(GatewayError::Command("NOGROUP".into()), "scan_failure")]
#[case::unavailable(GatewayError::Unavailable("refused".into()), "store_unavailable")]
#[tokio::test]
async fn scan_failure_aborts_before_claim(#[case] fault: GatewayError, #[case] kind: &str) {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 3, 0).await;
    let gateway = gateway_with(store);
    gateway.fail_scan(fault);

    let err = sweeper(gateway.clone(), config()).run_pass().await.unwrap_err();

    assert_eq!(err.kind(), kind);
    assert_eq!(gateway.calls(), vec![Call::PendingSummary]);
}

#[tokio::test]
async fn missing_group_surfaces_as_scan_failure() {
    let gateway = gateway_with(InMemoryStreamStore::new());

    let err = sweeper(gateway, config()).run_pass().await.unwrap_err();

    assert!(matches!(err, SweepError::ScanFailure(msg) if msg.starts_with("NOGROUP")));
}

#[tokio::test]
async fn second_pass_after_success_finds_nothing() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 3, 0).await;
    let gateway = gateway_with(store);
    let sweeper = sweeper(gateway.clone(), config());

    let first = sweeper.run_pass().await.unwrap();
    assert_eq!(first.processed, 3);

    clock.advance(MIN_IDLE * 2);
    gateway.reset_calls();
    let second = sweeper.run_pass().await.unwrap();

    assert_eq!(second, ProcessResult::empty());
    assert_eq!(gateway.calls(), vec![Call::PendingSummary]);
}

#[tokio::test]
async fn failed_ack_is_rewritten_idempotently_on_a_later_pass() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    let (stale, _) = seed(&store, &clock, 2, 0).await;
    let gateway = gateway_with(store.clone());
    gateway.fail_ack(stale[0]);
    let sweeper = sweeper(gateway.clone(), config());

    let first = sweeper.run_pass().await.unwrap();
    assert_eq!((first.claimed, first.processed), (2, 1));
    // 書き込みは済んでいるが ack されていない
    assert!(store.index_record("tweet:s0").await.is_some());
    assert_eq!(
        store.pending_owner(STREAM, GROUP, stale[0]).await.as_deref(),
        Some(RECOVERY)
    );

    gateway.clear_faults();
    clock.advance(MIN_IDLE * 2);
    let second = sweeper.run_pass().await.unwrap();

    assert_eq!(
        (second.pending, second.claimed, second.processed),
        (1, 1, 1)
    );
    assert_eq!(store.index_len().await, 2);
    assert_eq!(store.index_record("tweet:s0").await.unwrap(), tweet("s0"));
}

#[tokio::test]
async fn entry_without_key_field_is_left_pending() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    let (stale, _) = seed(&store, &clock, 2, 0).await;
    let gateway = gateway_with(store.clone());
    let config = config().with_index_key(IndexKeyPolicy::new("tweet:", "tweet_id"));

    let result = sweeper(gateway.clone(), config).run_pass().await.unwrap();

    assert_eq!((result.claimed, result.processed), (2, 0));
    assert!(gateway.writes().is_empty());
    assert!(gateway.acked().is_empty());
    assert_eq!(
        store.pending_owner(STREAM, GROUP, stale[0]).await.as_deref(),
        Some(RECOVERY)
    );
}

#[tokio::test]
async fn claim_reply_outside_candidates_is_ignored() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    let (stale, _) = seed(&store, &clock, 1, 0).await;
    let gateway = gateway_with(store);
    let stray = StreamEntry::new("999-0".parse().unwrap(), tweet("stray"));
    let duplicate = StreamEntry::new(stale[0], tweet("s0"));
    gateway.claim_also_returns(vec![stray, duplicate]);

    let result = sweeper(gateway.clone(), config()).run_pass().await.unwrap();

    assert_eq!(
        (result.pending, result.claimed, result.processed),
        (1, 1, 1)
    );
    assert_eq!(gateway.writes(), vec!["tweet:s0".to_string()]);
}

#[tokio::test]
async fn scan_limit_caps_candidates() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    let (stale, _) = seed(&store, &clock, 5, 0).await;
    let gateway = gateway_with(store);
    let config = config().with_scan_limit(Some(2));

    let result = sweeper(gateway.clone(), config).run_pass().await.unwrap();

    assert_eq!(
        (result.pending, result.claimed, result.processed),
        (2, 2, 2)
    );
    assert!(gateway.calls().contains(&Call::PendingDetails { limit: 2 }));
    // 古いものから順に
    let mut acked = gateway.acked();
    acked.sort();
    assert_eq!(acked, stale[..2].to_vec());
}

#[tokio::test]
async fn zero_min_idle_claims_everything_pending() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 1, 2).await;
    let gateway = gateway_with(store);
    let mut config = config();
    config.min_idle = Duration::ZERO;

    let result = sweeper(gateway, config).run_pass().await.unwrap();

    assert_eq!(
        (result.pending, result.claimed, result.processed),
        (3, 3, 3)
    );
}

#[tokio::test(start_paused = true)]
async fn pass_deadline_aborts_stragglers() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    let (stale, _) = seed(&store, &clock, 3, 0).await;
    let gateway = gateway_with(store.clone());
    gateway.hang_write("tweet:s1");
    let config = config()
        .with_call_timeout(Duration::from_secs(600))
        .with_pass_timeout(Duration::from_secs(2));

    let result = sweeper(gateway.clone(), config).run_pass().await.unwrap();

    assert_eq!(
        (result.pending, result.claimed, result.processed),
        (3, 3, 2)
    );
    assert!(result.time_taken_secs >= 2.0);
    assert!(!gateway.acked().contains(&stale[1]));
    assert!(store.pending_owner(STREAM, GROUP, stale[1]).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn slow_write_times_out_per_call() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 2, 0).await;
    let gateway = gateway_with(store);
    gateway.hang_write("tweet:s0");
    let config = config()
        .with_call_timeout(Duration::from_secs(1))
        .with_pass_timeout(Duration::from_secs(600));

    let result = sweeper(gateway.clone(), config).run_pass().await.unwrap();

    assert_eq!((result.claimed, result.processed), (2, 1));
    assert!(result.time_taken_secs < 600.0);
}

#[tokio::test(start_paused = true)]
async fn hanging_claim_times_out_the_pass() {
    struct HangingClaim(ScriptedGateway);

    #[async_trait::async_trait]
    impl sweeper_core::ports::StreamGateway for HangingClaim {
        async fn pending_summary(
            &self,
            stream: &str,
            group: &str,
        ) -> Result<sweeper_core::domain::PendingSummary, GatewayError> {
            self.0.pending_summary(stream, group).await
        }

        async fn pending_details(
            &self,
            stream: &str,
            group: &str,
            range: sweeper_core::domain::IdRange,
            limit: usize,
        ) -> Result<Vec<sweeper_core::domain::PendingRecord>, GatewayError> {
            self.0.pending_details(stream, group, range, limit).await
        }

        async fn claim(
            &self,
            _stream: &str,
            _group: &str,
            _consumer: &str,
            _min_idle: Duration,
            _ids: &[sweeper_core::domain::EntryId],
        ) -> Result<Vec<StreamEntry>, GatewayError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn write_index_record(
            &self,
            key: &str,
            fields: &sweeper_core::domain::Fields,
        ) -> Result<(), GatewayError> {
            self.0.write_index_record(key, fields).await
        }

        async fn acknowledge(
            &self,
            stream: &str,
            group: &str,
            id: sweeper_core::domain::EntryId,
        ) -> Result<(), GatewayError> {
            self.0.acknowledge(stream, group, id).await
        }
    }

    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    seed(&store, &clock, 1, 0).await;
    let gateway = Arc::new(HangingClaim(ScriptedGateway::new(store)));
    let sweeper = sweeper_core::Sweeper::builder(config().with_call_timeout(Duration::from_secs(3)))
        .gateway(gateway)
        .build()
        .unwrap();

    let err = sweeper.run_pass().await.unwrap_err();

    assert_eq!(
        err,
        SweepError::Timeout {
            stage: Stage::Claim,
            after: Duration::from_secs(3)
        }
    );
}

#[tokio::test]
async fn binary_payload_is_written_back_unchanged() {
    let clock = noon();
    let store = InMemoryStreamStore::with_clock(clock.clone());
    store.create_group(STREAM, GROUP).await.unwrap();
    let mut payload = tweet("bin");
    payload.insert("media", vec![0x89, b'P', b'N', b'G', 0xff, 0x00]);
    let id = store.append(STREAM, payload.clone()).await;
    store.append(STREAM, tweet("plain")).await;
    store.read_group(STREAM, GROUP, "worker-1", 2).await.unwrap();
    clock.advance(MIN_IDLE * 2);
    let gateway = gateway_with(store.clone());

    let result = sweeper(gateway.clone(), config()).run_pass().await.unwrap();

    assert_eq!((result.pending, result.claimed, result.processed), (2, 2, 2));
    assert_eq!(store.index_record("tweet:bin").await.unwrap(), payload);
    assert!(gateway.acked().contains(&id));
}

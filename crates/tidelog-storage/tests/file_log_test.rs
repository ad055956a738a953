//! Integration tests for the file-emulated log

use bytes::Bytes;
use std::collections::BTreeMap;
use tempfile::TempDir;
use tidelog_core::{
    ConsumerSpec, Error, GroupLifecycle, LogAdmin, LogBackend, LogConfig, OffsetReset,
    ProducerRecord, Record, Watermark,
};
use tidelog_storage::{FileLog, LocalConfig};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn create_local_log(config: LogConfig) -> (FileLog, TempDir) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let log = FileLog::local(
        &LocalConfig {
            root: temp_dir.path().join("log"),
        },
        config,
    )
    .unwrap();
    (log, temp_dir)
}

fn keyed(key: &str, value: &str) -> ProducerRecord {
    ProducerRecord::new(
        Some(Bytes::from(key.to_string())),
        Some(Bytes::from(value.to_string())),
    )
}

async fn produce(log: &FileLog, topic: &str, records: Vec<ProducerRecord>) {
    let mut producer = log.open_producer(topic).await.unwrap();
    producer.produce(records).await.unwrap();
}

async fn read_all(log: &FileLog, spec: ConsumerSpec) -> Vec<Record> {
    let mut consumer = log.open_consumer(spec).await.unwrap();
    let mut records = Vec::new();
    loop {
        let batch = consumer.consume(usize::MAX).await.unwrap();
        if batch.is_empty() {
            break;
        }
        records.extend(batch);
    }
    consumer.close().await.unwrap();
    records
}

#[tokio::test]
async fn test_round_trip_single_partition() {
    let (log, _dir) = create_local_log(LogConfig::default());
    log.create_topic("orders", 1, Default::default()).await.unwrap();

    let records: Vec<ProducerRecord> = (0..25)
        .map(|i| {
            keyed(&format!("key-{i}"), &format!("value-{i}"))
                .with_header("source", Bytes::from_static(b"test"))
                .with_header("source", Bytes::from_static(b"\x00\x01"))
                .with_timestamp(1_700_000_000_000 + i)
        })
        .collect();
    // Split across two produce calls so the reader crosses a file boundary.
    let (first, second) = records.split_at(10);
    produce(&log, "orders", first.to_vec()).await;
    produce(&log, "orders", second.to_vec()).await;

    let read = read_all(&log, ConsumerSpec::topic("orders")).await;
    assert_eq!(read.len(), 25);
    for (i, (sent, got)) in records.iter().zip(&read).enumerate() {
        assert_eq!(got.offset, i as u64);
        assert_eq!(got.key, sent.key);
        assert_eq!(got.value, sent.value);
        assert_eq!(got.headers, sent.headers);
        assert_eq!(got.timestamp.millis, 1_700_000_000_000 + i as i64);
    }
}

#[tokio::test]
async fn test_offsets_gap_free_per_partition() {
    let (log, _dir) = create_local_log(LogConfig::default());
    log.create_topic("events", 4, Default::default()).await.unwrap();

    for batch in 0..5 {
        let records = (0..20)
            .map(|i| keyed(&format!("k{}", (batch * 20 + i) % 7), "v"))
            .collect();
        produce(&log, "events", records).await;
    }

    let read = read_all(&log, ConsumerSpec::topic("events")).await;
    assert_eq!(read.len(), 100);

    let mut by_partition: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
    for record in &read {
        by_partition.entry(record.partition).or_default().push(record.offset);
    }
    let watermarks = log.watermarks("events").await.unwrap();
    for (partition, offsets) in by_partition {
        let expected: Vec<u64> = (0..offsets.len() as u64).collect();
        assert_eq!(offsets, expected, "partition {partition}");
        assert_eq!(watermarks[&partition].high, offsets.len() as u64);
    }
}

#[tokio::test]
async fn test_same_key_order_preserved_across_partitions() {
    let (log, _dir) = create_local_log(LogConfig::default());
    log.create_topic("keyed", 3, Default::default()).await.unwrap();

    let records = ["1", "1", "1", "2", "2", "2", "3", "3", "3"]
        .iter()
        .enumerate()
        .map(|(i, key)| keyed(key, &format!("{key}-{i}")))
        .collect();
    produce(&log, "keyed", records).await;

    let read = read_all(&log, ConsumerSpec::topic("keyed")).await;
    assert_eq!(read.len(), 9);

    for key in ["1", "2", "3"] {
        let group: Vec<&Record> = read
            .iter()
            .filter(|r| r.key.as_deref() == Some(key.as_bytes()))
            .collect();
        assert_eq!(group.len(), 3);
        assert!(group.iter().all(|r| r.partition == group[0].partition));
        assert!(group.windows(2).all(|w| w[0].offset < w[1].offset));

        let values: Vec<String> = group
            .iter()
            .map(|r| String::from_utf8(r.value.clone().unwrap().to_vec()).unwrap())
            .collect();
        let mut sorted = values.clone();
        sorted.sort();
        assert_eq!(values, sorted);
    }
}

#[tokio::test]
async fn test_commit_and_resume() {
    let config = LogConfig::default().with_auto_commit(false);
    let (log, _dir) = create_local_log(config);
    log.create_topic("jobs", 1, Default::default()).await.unwrap();
    produce(&log, "jobs", (0..10).map(|i| keyed("k", &i.to_string())).collect()).await;

    let mut consumer = log
        .open_consumer(ConsumerSpec::topic("jobs").with_group("workers"))
        .await
        .unwrap();
    let batch = consumer.consume(4).await.unwrap();
    assert_eq!(batch.last().unwrap().offset, 3);
    consumer.commit(None).await.unwrap();
    consumer.close().await.unwrap();

    let state = log.describe_group("workers").await.unwrap().unwrap();
    assert_eq!(state.offsets["jobs"][&0], 4);
    assert_eq!(state.state, GroupLifecycle::Empty);

    let mut resumed = log
        .open_consumer(ConsumerSpec::topic("jobs").with_group("workers"))
        .await
        .unwrap();
    let batch = resumed.consume(100).await.unwrap();
    assert_eq!(batch.first().unwrap().offset, 4);
    assert_eq!(batch.len(), 6);
    assert_eq!(
        log.describe_group("workers").await.unwrap().unwrap().state,
        GroupLifecycle::Stable
    );
}

#[tokio::test]
async fn test_auto_commit_after_batch() {
    let (log, _dir) = create_local_log(LogConfig::default());
    log.create_topic("jobs", 2, Default::default()).await.unwrap();
    produce(
        &log,
        "jobs",
        (0..6).map(|i| keyed(&i.to_string(), "v")).collect(),
    )
    .await;

    let mut consumer = log
        .open_consumer(ConsumerSpec::topic("jobs").with_group("auto"))
        .await
        .unwrap();
    consumer.consume(usize::MAX).await.unwrap();

    let lags = log.lags("auto", "jobs").await.unwrap();
    assert!(lags.values().all(|lag| *lag == 0), "lags: {lags:?}");
}

#[tokio::test]
async fn test_latest_policy_skips_existing() {
    let config = LogConfig::default().with_auto_offset_reset(OffsetReset::Latest);
    let (log, _dir) = create_local_log(config);
    log.create_topic("feed", 1, Default::default()).await.unwrap();
    produce(&log, "feed", vec![keyed("a", "old")]).await;

    let mut consumer = log.open_consumer(ConsumerSpec::topic("feed")).await.unwrap();
    assert!(consumer.consume(10).await.unwrap().is_empty());

    produce(&log, "feed", vec![keyed("a", "new")]).await;
    let batch = consumer.consume(10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].value.as_deref(), Some(&b"new"[..]));
}

#[tokio::test]
async fn test_explicit_and_negative_offsets() {
    let (log, _dir) = create_local_log(LogConfig::default());
    log.create_topic("nums", 1, Default::default()).await.unwrap();
    produce(&log, "nums", (0..10).map(|i| keyed("k", &i.to_string())).collect()).await;

    let tail = read_all(
        &log,
        ConsumerSpec::topic("nums").with_offsets(BTreeMap::from([(0, -2)])),
    )
    .await;
    assert_eq!(tail.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![8, 9]);

    let window = read_all(
        &log,
        ConsumerSpec::topic("nums")
            .with_offsets(BTreeMap::from([(0, 3)]))
            .with_end_offsets(BTreeMap::from([(0, 5)])),
    )
    .await;
    assert_eq!(window.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![3, 4, 5]);
}

#[tokio::test]
async fn test_multi_topic_consumer_fails_fast() {
    let (log, _dir) = create_local_log(LogConfig::default());
    log.create_topic("a", 1, Default::default()).await.unwrap();
    log.create_topic("b", 1, Default::default()).await.unwrap();

    let spec = ConsumerSpec {
        topics: vec!["a".to_string(), "b".to_string()],
        ..Default::default()
    };
    let err = log.open_consumer(spec).await.err().unwrap();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[tokio::test]
async fn test_watermarks_of_missing_topic() {
    let log = FileLog::memory(LogConfig::default()).unwrap();
    let err = log.watermarks("ghost").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_admin_lifecycle() {
    let (log, _dir) = create_local_log(LogConfig::default());
    let config = BTreeMap::from([("retention.ms".to_string(), "86400000".to_string())]);
    log.create_topic("orders", 3, config.clone()).await.unwrap();
    log.create_topic("orders-dlq", 1, Default::default()).await.unwrap();
    log.create_topic("payments", 2, Default::default()).await.unwrap();

    assert_eq!(
        log.list_topics("orders*").await.unwrap(),
        vec!["orders", "orders-dlq"]
    );
    assert_eq!(log.partitions("pay*").await.unwrap()["payments"], 2);
    assert_eq!(log.topic_config("orders").await.unwrap(), config);
    assert!(log.exists("payments").await.unwrap());

    let watermarks = log.watermarks("orders").await.unwrap();
    assert_eq!(watermarks.len(), 3);
    assert!(watermarks.values().all(|wm| *wm == Watermark::default()));

    produce(&log, "orders", (0..9).map(|i| keyed(&i.to_string(), "v")).collect()).await;
    let sizes = log.size("orders").await.unwrap();
    assert_eq!(sizes["orders"].values().sum::<u64>(), 9);

    log.recreate("orders").await.unwrap();
    assert_eq!(log.partitions("orders").await.unwrap()["orders"], 3);
    assert_eq!(log.topic_config("orders").await.unwrap(), config);
    assert_eq!(log.size("orders").await.unwrap()["orders"].values().sum::<u64>(), 0);

    let deleted = log.delete_topics("orders*").await.unwrap();
    assert_eq!(deleted, vec!["orders", "orders-dlq"]);
    assert_eq!(log.list_topics("*").await.unwrap(), vec!["payments"]);
    assert!(!log.exists("orders").await.unwrap());
}

#[tokio::test]
async fn test_offsets_for_times() {
    let log = FileLog::memory(LogConfig::default()).unwrap();
    log.create_topic("ticks", 1, Default::default()).await.unwrap();
    produce(
        &log,
        "ticks",
        (0..5).map(|i| keyed("k", "v").with_timestamp(1000 + i * 100)).collect(),
    )
    .await;

    let offsets = log
        .offsets_for_times("ticks", &BTreeMap::from([(0, 1250)]))
        .await
        .unwrap();
    assert_eq!(offsets[&0], 3);

    let offsets = log
        .offsets_for_times("ticks", &BTreeMap::from([(0, 99_999)]))
        .await
        .unwrap();
    assert_eq!(offsets[&0], 5);
}

#[tokio::test]
async fn test_groups_admin() {
    let log = FileLog::memory(LogConfig::default().with_consumer_group_prefix("tmp-")).unwrap();
    log.create_topic("t", 1, Default::default()).await.unwrap();
    produce(&log, "t", vec![keyed("k", "v")]).await;

    let consumer = log.open_consumer(ConsumerSpec::topic("t")).await.unwrap();
    let group = consumer.group().to_string();
    assert!(group.starts_with("tmp-"));

    assert_eq!(log.list_groups("tmp-*").await.unwrap(), vec![group.clone()]);
    assert_eq!(log.lags(&group, "t").await.unwrap()[&0], 1);
    assert_eq!(
        log.groups_for_topic("*", "t").await.unwrap(),
        vec![group.clone()]
    );

    log.delete_group(&group).await.unwrap();
    assert!(log.describe_group(&group).await.unwrap().is_none());
}

#[tokio::test]
async fn test_custom_separator() {
    let log = FileLog::memory(LogConfig::default().with_message_separator("\u{1e}")).unwrap();
    log.create_topic("sep", 1, Default::default()).await.unwrap();
    produce(&log, "sep", vec![keyed("a", "line\nbreak"), keyed("b", "x")]).await;

    let read = read_all(&log, ConsumerSpec::topic("sep")).await;
    assert_eq!(read.len(), 2);
    assert_eq!(read[0].value.as_deref(), Some(&b"line\nbreak"[..]));
}

#[tokio::test]
async fn test_seek_moves_read_position() {
    let log = FileLog::memory(LogConfig::default()).unwrap();
    log.create_topic("seek", 1, Default::default()).await.unwrap();
    produce(
        &log,
        "seek",
        (0..5).map(|i| keyed("k", &format!("v{i}"))).collect(),
    )
    .await;

    let mut consumer = log
        .open_consumer(ConsumerSpec::topic("seek").with_auto_commit(false))
        .await
        .unwrap();
    let first = consumer.consume(2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(consumer.positions()[&0], 2);

    consumer.seek(0, 4);
    let tail = consumer.consume(10).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].offset, 4);

    consumer.seek(0, 0);
    let again = consumer.consume(1).await.unwrap();
    assert_eq!(again[0].value.as_deref(), Some(&b"v0"[..]));
    consumer.close().await.unwrap();
}

#[test]
fn test_printable_separator_rejected() {
    let result = FileLog::memory(LogConfig::default().with_message_separator(","));
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn test_invalid_names_rejected() {
    let log = FileLog::memory(LogConfig::default()).unwrap();
    let err = log.create_topic("bad/name", 1, Default::default()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidName { .. }));

    let err = log.create_topic("ok", 0, Default::default()).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

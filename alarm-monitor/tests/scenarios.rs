// End-to-end flap suppression scenarios on a 3000ms window
use alarm_monitor::{
    EntityKey, Event, MatchPolicy, Monitor, MonitorConfig, OutputRecord, PartitionWorker,
    RawEvent, RecordKind, Severity,
};

fn run(events: &[Event], config: &MonitorConfig) -> Vec<OutputRecord> {
    let mut worker = PartitionWorker::new(0, config);
    let mut out = Vec::new();
    for event in events {
        out.extend(worker.process_event(event.clone()).unwrap());
    }
    out
}

fn tick(key: i64, t: i64) -> Event {
    Event::new(key, Severity::Other, t)
}

fn for_key(records: &[OutputRecord], key: &str) -> Vec<OutputRecord> {
    records
        .iter()
        .filter(|r| r.entity_key == EntityKey::Name(key.to_string()))
        .cloned()
        .collect()
}

fn kinds(records: &[OutputRecord]) -> Vec<RecordKind> {
    records.iter().map(|r| r.kind).collect()
}

#[test]
fn clear_within_window_is_suppressed() {
    let out = run(
        &[Event::critical("A", 0), Event::clear("A", 2500)],
        &MonitorConfig::new(),
    );

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, RecordKind::Suppressed);
    assert_eq!(out[0].entity_key, EntityKey::Name("A".to_string()));
    assert_eq!(out[0].first_event_time, 0);
    assert_eq!(out[0].second_event_time, Some(2500));
}

#[test]
fn alarm_fires_once_clock_passes_deadline() {
    let config = MonitorConfig::new();
    let mut worker = PartitionWorker::new(0, &config);

    worker.process_event(Event::critical("A", 0)).unwrap();
    assert!(worker.process_event(tick(99, 2999)).unwrap().is_empty());

    // A CLEAR stamped 3000 could still follow, so the deadline holds
    assert!(worker.process_event(tick(99, 3000)).unwrap().is_empty());

    let out = worker.process_event(tick(99, 3001)).unwrap();
    assert_eq!(kinds(&out), vec![RecordKind::Alarm]);
    assert_eq!(out[0].first_event_time, 0);
    assert_eq!(out[0].second_event_time, None);

    // Nothing more once the match has expired
    assert!(worker.process_event(tick(99, 10_000)).unwrap().is_empty());
}

#[test]
fn punctuation_fires_exactly_at_deadline() {
    let config = MonitorConfig::new();
    let mut worker = PartitionWorker::new(0, &config);

    worker.process_event(Event::critical("A", 0)).unwrap();
    assert!(worker.advance_watermark(2999).unwrap().is_empty());
    assert_eq!(kinds(&worker.advance_watermark(3000).unwrap()), vec![RecordKind::Alarm]);
}

#[test]
fn same_timestamp_events_of_other_keys_do_not_expire_the_window() {
    let config = MonitorConfig::new();
    let alone = run(&[Event::critical("A", 0), Event::clear("A", 3000)], &config);
    let mixed = run(
        &[
            Event::critical("A", 0),
            Event::new("B", Severity::Other, 3000),
            Event::clear("A", 3000),
        ],
        &config,
    );

    assert_eq!(kinds(&alone), vec![RecordKind::Suppressed]);
    assert_eq!(for_key(&mixed, "A"), alone);
}

#[test]
fn zero_window_clear_at_same_time_is_suppressed() {
    let config = MonitorConfig::new().with_window_duration_ms(0);
    let out = run(&[Event::critical("A", 100), Event::clear("A", 100)], &config);
    assert_eq!(kinds(&out), vec![RecordKind::Suppressed]);

    let out = run(&[Event::critical("A", 100), Event::clear("A", 101)], &config);
    assert_eq!(kinds(&out), vec![RecordKind::Alarm]);
}

#[test]
fn clear_on_deadline_is_inclusive() {
    let on_deadline = run(
        &[Event::critical(1, 0), Event::clear(1, 3000)],
        &MonitorConfig::new(),
    );
    assert_eq!(kinds(&on_deadline), vec![RecordKind::Suppressed]);

    let after_deadline = run(
        &[Event::critical(1, 0), Event::clear(1, 3001)],
        &MonitorConfig::new(),
    );
    assert_eq!(kinds(&after_deadline), vec![RecordKind::Alarm]);
}

#[test]
fn clear_after_alarm_produces_nothing_more() {
    let config = MonitorConfig::new();
    let mut worker = PartitionWorker::new(0, &config);

    worker.process_event(Event::critical("A", 0)).unwrap();
    let alarm = worker.process_event(tick(5, 3001)).unwrap();
    assert_eq!(kinds(&alarm), vec![RecordKind::Alarm]);

    let out = worker.process_event(Event::clear("A", 3500)).unwrap();
    assert!(out.is_empty());
    let stats = worker.stats();
    assert_eq!(stats.late_events, 1);
    assert_eq!(stats.unmatched_clears, 0);
    assert_eq!(stats.suppressed, 0);
}

#[test]
fn clear_below_watermark_is_late() {
    let config = MonitorConfig::new();
    let mut worker = PartitionWorker::new(0, &config);

    worker.process_event(Event::critical("A", 0)).unwrap();
    let alarm = worker.process_event(tick(5, 3001)).unwrap();
    assert_eq!(kinds(&alarm), vec![RecordKind::Alarm]);

    assert!(worker.process_event(Event::clear("A", 2500)).unwrap().is_empty());
    let stats = worker.stats();
    assert_eq!(stats.late_events, 1);
    assert_eq!(stats.suppressed, 0);
    assert_eq!(stats.alarms, 1);
}

#[test]
fn late_critical_opens_nothing() {
    let config = MonitorConfig::new();
    let mut worker = PartitionWorker::new(0, &config);

    worker.process_event(tick(1, 5000)).unwrap();
    worker.process_event(Event::critical(1, 4000)).unwrap();

    assert_eq!(worker.stats().late_events, 1);
    assert_eq!(worker.stats().open_matches, 0);
}

#[test]
fn idle_clear_is_noop() {
    let config = MonitorConfig::new();
    let mut worker = PartitionWorker::new(0, &config);

    assert!(worker.process_event(Event::clear(1, 100)).unwrap().is_empty());
    assert!(worker.automaton().open_matches_for(&EntityKey::Id(1)).is_empty());
    assert_eq!(worker.stats().unmatched_clears, 1);
    assert_eq!(worker.stats().open_matches, 0);
}

#[test]
fn replay_is_deterministic() {
    let events = vec![
        Event::critical(1, 0),
        Event::critical(1, 100),
        Event::clear(1, 1000),
        Event::critical(1, 1500),
        tick(1, 2000),
        Event::critical(1, 2000),
        tick(1, 4500),
        Event::clear(1, 4600),
        tick(1, 9000),
    ];
    let config = MonitorConfig::new();

    assert_eq!(run(&events, &config), run(&events, &config));
}

#[test]
fn keys_are_independent() {
    let a = vec![Event::critical("A", 0), Event::clear("A", 1000), Event::critical("A", 2000)];
    let b = vec![Event::critical("B", 0), Event::clear("B", 4000)];
    let config = MonitorConfig::new();

    let mut interleaved = vec![
        a[0].clone(),
        b[0].clone(),
        a[1].clone(),
        a[2].clone(),
        b[1].clone(),
        tick(0, 6000),
    ];
    let combined = run(&interleaved, &config);

    let mut alone_a = a.clone();
    alone_a.push(tick(0, 6000));
    let mut alone_b = b.clone();
    alone_b.push(tick(0, 6000));

    assert_eq!(for_key(&combined, "A"), run(&alone_a, &config));
    assert_eq!(for_key(&combined, "B"), run(&alone_b, &config));

    // B's CLEAR at 4000 is past its 3000 deadline
    assert_eq!(kinds(&for_key(&combined, "B")), vec![RecordKind::Alarm]);

    // Both CRITICALs share t=0, so either order is clock-ordered
    interleaved.swap(0, 1);
    let swapped = run(&interleaved, &config);
    assert_eq!(for_key(&swapped, "A"), for_key(&combined, "A"));
    assert_eq!(for_key(&swapped, "B"), for_key(&combined, "B"));
}

#[test]
fn overlapping_matches_are_timed_separately() {
    let config = MonitorConfig::new().with_match_policy(MatchPolicy::Overlapping);
    let mut worker = PartitionWorker::new(0, &config);

    worker.process_event(Event::critical(1, 0)).unwrap();
    worker.process_event(Event::critical(1, 2000)).unwrap();

    let first = worker.process_event(tick(1, 3001)).unwrap();
    assert_eq!(kinds(&first), vec![RecordKind::Alarm]);
    assert_eq!(first[0].first_event_time, 0);

    let second = worker.process_event(Event::clear(1, 4000)).unwrap();
    assert_eq!(kinds(&second), vec![RecordKind::Suppressed]);
    assert_eq!(second[0].first_event_time, 2000);
}

#[test]
fn single_open_serializes_matches() {
    let config = MonitorConfig::new().with_match_policy(MatchPolicy::SingleOpen);
    let mut worker = PartitionWorker::new(0, &config);

    worker.process_event(Event::critical(1, 0)).unwrap();
    worker.process_event(Event::critical(1, 2000)).unwrap();

    let out = worker.process_event(tick(1, 5000)).unwrap();
    assert_eq!(kinds(&out), vec![RecordKind::Alarm]);
    assert_eq!(worker.stats().folded_criticals, 1);

    // The key is idle again, so a new CRITICAL opens a fresh window
    worker.process_event(Event::critical(1, 6000)).unwrap();
    let out = worker.process_event(Event::clear(1, 6500)).unwrap();
    assert_eq!(kinds(&out), vec![RecordKind::Suppressed]);
    assert_eq!(out[0].first_event_time, 6000);
}

#[test]
fn same_deadline_fires_in_creation_order() {
    let config = MonitorConfig::new();
    let mut worker = PartitionWorker::new(0, &config);

    worker.process_event(Event::critical(3, 0)).unwrap();
    worker.process_event(Event::critical(1, 0)).unwrap();
    worker.process_event(Event::critical(2, 0)).unwrap();

    let out = worker.advance_watermark(3000).unwrap();
    let keys: Vec<EntityKey> = out.iter().map(|r| r.entity_key.clone()).collect();
    assert_eq!(keys, vec![EntityKey::Id(3), EntityKey::Id(1), EntityKey::Id(2)]);
}

#[test]
fn sharded_batch_matches_sequential_run() {
    let mut events = Vec::new();
    for key in 0..16_i64 {
        events.push(Event::critical(key, key * 10));
    }
    for key in (0..16_i64).filter(|k| k % 2 == 0) {
        events.push(Event::clear(key, 2000 + key));
    }
    events.push(tick(0, 10_000));

    let sequential = {
        let mut monitor = Monitor::new(MonitorConfig::new()).unwrap();
        let mut out = Vec::new();
        for event in &events {
            out.extend(monitor.process_event(event.clone()).unwrap());
        }
        out.extend(monitor.advance_watermark(10_000).records);
        out
    };

    let mut sharded = Monitor::new(MonitorConfig::new().with_partition_count(4)).unwrap();
    let raws: Vec<RawEvent> = events.into_iter().map(RawEvent::from).collect();
    let batch = sharded.process_batch(raws);
    assert!(batch.is_complete());
    let mut out = batch.records;
    out.extend(sharded.advance_watermark(10_000).records);

    let mut expected = sequential.clone();
    expected.sort_by_key(|r| r.entity_key.clone());
    out.sort_by_key(|r| r.entity_key.clone());
    assert_eq!(out, expected);

    let stats = sharded.stats();
    assert_eq!(stats.alarms, 8);
    assert_eq!(stats.suppressed, 8);
    assert_eq!(stats.open_matches, 0);
}

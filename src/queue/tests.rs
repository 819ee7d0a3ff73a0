//! Tests for the tailing queue.

use super::*;
use crate::error::CorralError;
use crate::store::{DocumentStore, MemoryStore, StoreError};
use crate::test_support::{FlakyStore, ManualClock};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

const FAST_AWAIT: Duration = Duration::from_millis(10);

fn memory_queue(name: &str, max_size: u64) -> TailingQueue<i64, MemoryStore> {
    TailingQueue::new(Arc::new(MemoryStore::new()), name)
        .with_max_size(max_size)
        .with_await_timeout(FAST_AWAIT)
}

/// Consume until `expected` items arrived, then stop the loop.
fn collect(queue: &TailingQueue<i64, impl DocumentStore>, expected: usize) -> Vec<i64> {
    let stop = queue.stop_token();
    let mut items = Vec::new();
    queue.poll(|item| {
        items.push(item);
        if items.len() >= expected {
            stop.stop();
        }
    });
    items
}

#[test]
fn init_is_idempotent_and_preserves_data() {
    let queue = memory_queue("events", 10);

    queue.init().unwrap();
    queue.init().unwrap();

    for i in 0..3 {
        queue.add(&i).unwrap();
    }
    queue.init().unwrap();

    assert_eq!(queue.size().unwrap(), 3);
}

#[test]
fn overflow_evicts_the_oldest_entries() {
    let queue = memory_queue("events", 5);
    queue.init().unwrap();

    for i in 0..8 {
        queue.add(&i).unwrap();
    }

    assert!(queue.size().unwrap() <= 5);
    // Entries 0..3 are unrecoverable; the survivors arrive in order.
    assert_eq!(collect(&queue, 5), vec![3, 4, 5, 6, 7]);
}

#[test]
fn entries_are_delivered_in_insertion_order_without_duplicates() {
    let queue = memory_queue("events", 100);
    queue.init().unwrap();

    let consumer = queue.clone();
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        consumer.poll(move |item: i64| {
            // The receiver half decides when enough arrived.
            let _ = tx.send(item);
        });
    });

    // Give the consumer time to open its cursor before producing.
    thread::sleep(Duration::from_millis(50));
    for i in 0..5 {
        queue.add(&i).unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    queue.stop();
    handle.join().unwrap();

    assert_eq!(received, vec![0, 1, 2, 3, 4]);
    assert!(rx.try_recv().is_err(), "no duplicate deliveries expected");
}

#[test]
fn stop_makes_an_idle_poll_return_promptly() {
    let queue = memory_queue("events", 10);
    queue.init().unwrap();

    let consumer = queue.clone();
    let handle = thread::spawn(move || {
        let mut callbacks = 0usize;
        consumer.poll(|_item| callbacks += 1);
        callbacks
    });

    thread::sleep(Duration::from_millis(50));
    let stopped_at = Instant::now();
    queue.stop();

    let callbacks = handle.join().unwrap();
    // Exit is bounded by the cursor await timeout, not by new data.
    assert!(stopped_at.elapsed() < Duration::from_secs(1));
    assert_eq!(callbacks, 0);
}

#[test]
fn poll_after_stop_issues_no_callbacks() {
    let queue = memory_queue("events", 10);
    queue.init().unwrap();
    queue.add(&1).unwrap();

    queue.stop();

    let mut callbacks = 0usize;
    queue.poll(|_item| callbacks += 1);
    assert_eq!(callbacks, 0);
}

#[test]
fn consumer_survives_failed_cursor_opens() {
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let queue: TailingQueue<i64, FlakyStore> = TailingQueue::new(Arc::clone(&store), "events")
        .with_max_size(10)
        .with_await_timeout(FAST_AWAIT)
        .with_clock(ManualClock::new());
    queue.init().unwrap();
    for i in 0..3 {
        queue.add(&i).unwrap();
    }

    store.fail_tail_opens(2);

    assert_eq!(collect(&queue, 3), vec![0, 1, 2]);
}

#[test]
fn consumer_resubscribes_after_a_mid_stream_fault_without_losing_order() {
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let queue: TailingQueue<i64, FlakyStore> = TailingQueue::new(Arc::clone(&store), "events")
        .with_max_size(10)
        .with_await_timeout(FAST_AWAIT)
        .with_clock(ManualClock::new());
    queue.init().unwrap();
    for i in 0..4 {
        queue.add(&i).unwrap();
    }

    // The first advance dies; the loop must resubscribe and still deliver
    // every entry exactly once, in order.
    store.fail_next_advances(1);

    assert_eq!(collect(&queue, 4), vec![0, 1, 2, 3]);
}

#[test]
fn undecodable_entries_are_skipped_not_delivered() {
    let store = Arc::new(MemoryStore::new());
    let queue: TailingQueue<i64, MemoryStore> = TailingQueue::new(Arc::clone(&store), "events")
        .with_max_size(10)
        .with_await_timeout(FAST_AWAIT);
    queue.init().unwrap();

    queue.add(&1).unwrap();
    store
        .append("events", serde_json::json!({ "payload": "not a number" }))
        .unwrap();
    queue.add(&2).unwrap();

    assert_eq!(collect(&queue, 2), vec![1, 2]);
}

#[test]
fn destroy_deletes_the_backing_collection() {
    let queue = memory_queue("events", 10);
    queue.init().unwrap();
    queue.add(&1).unwrap();

    queue.destroy().unwrap();

    let err = queue.size().unwrap_err();
    assert!(matches!(
        err,
        CorralError::Store(StoreError::MissingCollection(_))
    ));

    // A fresh init starts the queue over from empty.
    queue.init().unwrap();
    assert_eq!(queue.size().unwrap(), 0);
}

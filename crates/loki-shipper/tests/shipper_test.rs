// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::mocks::{FlakyTransport, PanickingTransport, RecordingTransport};
use common::test_config;
use loki_shipper::{DispatcherState, LokiShipper, ShipperError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

async fn wait_for_dispatches(transport: &RecordingTransport, count: usize) {
    timeout(Duration::from_secs(2), async {
        while transport.dispatch_count() < count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatch did not happen in time");
}

#[tokio::test]
async fn test_single_producer_order_is_preserved() {
    let transport = Arc::new(RecordingTransport::default());
    let handle = LokiShipper::start(
        test_config(3, Duration::from_secs(60)),
        transport.clone(),
    )
    .unwrap();

    let expected: Vec<String> = (0..10).map(|i| format!("line {i}")).collect();
    for line in &expected {
        handle.append(line.clone()).unwrap();
    }
    handle.shutdown().await;

    assert_eq!(transport.lines(), expected);
}

#[tokio::test]
async fn test_graceful_shutdown_sends_partial_batch_once() {
    let transport = Arc::new(RecordingTransport::default());
    let handle = LokiShipper::start(
        test_config(100, Duration::from_secs(60)),
        transport.clone(),
    )
    .unwrap();

    for i in 0..7 {
        handle.append(format!("pending {i}")).unwrap();
    }
    handle.shutdown().await;

    assert_eq!(transport.dispatch_count(), 1);
    assert_eq!(transport.batches()[0].len(), 7);
    assert_eq!(handle.state(), DispatcherState::Terminated);
    assert_eq!(handle.stats().entries_sent, 7);
}

#[tokio::test]
async fn test_size_trigger_flushes_before_interval() {
    let transport = Arc::new(RecordingTransport::default());
    let handle = LokiShipper::start(
        test_config(5, Duration::from_secs(60)),
        transport.clone(),
    )
    .unwrap();

    let started = Instant::now();
    for i in 0..5 {
        handle.append(format!("entry {i}")).unwrap();
    }
    wait_for_dispatches(&transport, 1).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.batches()[0].len(), 5);
    assert_eq!(handle.pending(), 0);

    handle.shutdown().await;
    assert_eq!(transport.dispatch_count(), 1);
}

#[tokio::test]
async fn test_time_trigger_flushes_small_batch_once() {
    let transport = Arc::new(RecordingTransport::default());
    let handle = LokiShipper::start(
        test_config(100, Duration::from_millis(100)),
        transport.clone(),
    )
    .unwrap();

    for i in 0..3 {
        handle.append(format!("slow {i}")).unwrap();
    }
    wait_for_dispatches(&transport, 1).await;

    // Several more intervals elapse with an empty buffer.
    sleep(Duration::from_millis(350)).await;
    assert_eq!(transport.dispatch_count(), 1);
    assert_eq!(transport.batches()[0], vec!["slow 0", "slow 1", "slow 2"]);

    handle.shutdown().await;
    assert_eq!(transport.dispatch_count(), 1);
}

#[tokio::test]
async fn test_shutdown_twice_and_from_many_waiters() {
    let transport = Arc::new(RecordingTransport::default());
    let handle = LokiShipper::start(
        test_config(100, Duration::from_secs(60)),
        transport.clone(),
    )
    .unwrap();
    handle.append("a").unwrap();
    handle.append("b").unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.await_drained().await })
        })
        .collect();

    handle.initiate_shutdown();
    handle.initiate_shutdown();
    for waiter in waiters {
        timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }
    handle.shutdown().await;

    assert_eq!(transport.lines(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_failed_batch_does_not_block_later_batches() {
    let transport = Arc::new(FlakyTransport::failing_first(1));
    let handle = LokiShipper::start(
        test_config(2, Duration::from_secs(60)),
        transport.clone(),
    )
    .unwrap();

    handle.append("lost 1").unwrap();
    handle.append("lost 2").unwrap();
    timeout(Duration::from_secs(2), async {
        while transport.calls() < 1 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    handle.append("kept 1").unwrap();
    handle.append("kept 2").unwrap();
    handle.shutdown().await;

    assert_eq!(transport.inner.lines(), vec!["kept 1", "kept 2"]);
    let stats = handle.stats();
    assert_eq!(stats.batches_failed, 1);
    assert_eq!(stats.entries_dropped, 2);
    assert_eq!(stats.batches_sent, 1);
    assert_eq!(stats.entries_sent, 2);
}

#[tokio::test]
async fn test_append_after_termination_is_rejected() {
    let transport = Arc::new(RecordingTransport::default());
    let handle = LokiShipper::start(
        test_config(10, Duration::from_secs(60)),
        transport.clone(),
    )
    .unwrap();
    handle.append("in time").unwrap();
    handle.shutdown().await;

    let result = handle.append("too late");

    assert!(matches!(result, Err(ShipperError::Terminated)));
    assert_eq!(transport.lines(), vec!["in time"]);
    assert_eq!(handle.stats().entries_rejected, 1);
}

#[tokio::test]
async fn test_appends_during_slow_dispatch_are_not_lost() {
    let transport = Arc::new(RecordingTransport::with_delay(Duration::from_millis(50)));
    let handle = LokiShipper::start(
        test_config(2, Duration::from_secs(60)),
        transport.clone(),
    )
    .unwrap();

    for i in 0..9 {
        handle.append(format!("n{i}")).unwrap();
        sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await;

    let expected: Vec<String> = (0..9).map(|i| format!("n{i}")).collect();
    assert_eq!(transport.lines(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_producers_lose_nothing() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 250;

    let transport = Arc::new(RecordingTransport::default());
    let handle = LokiShipper::start(
        test_config(10, Duration::from_millis(20)),
        transport.clone(),
    )
    .unwrap();

    let threads: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let handle = handle.clone();
            std::thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    handle.append(format!("{p}:{i}")).unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    handle.shutdown().await;

    let lines = transport.lines();
    assert_eq!(lines.len(), PRODUCERS * PER_PRODUCER);
    for p in 0..PRODUCERS {
        let seen: Vec<usize> = lines
            .iter()
            .filter_map(|line| line.strip_prefix(&format!("{p}:")))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(seen, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_size_triggered_batches_are_contiguous_and_bounded() {
    const BATCH_SIZE: usize = 3;
    const ENTRIES: usize = 15;

    let transport = Arc::new(RecordingTransport::default());
    let handle = LokiShipper::start(
        test_config(BATCH_SIZE, Duration::from_secs(60)),
        transport.clone(),
    )
    .unwrap();

    let expected: Vec<String> = (0..ENTRIES).map(|i| format!("e{i}")).collect();
    for group in expected.chunks(BATCH_SIZE) {
        for line in group {
            handle.append(line.clone()).unwrap();
        }
        sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await;

    let batches = transport.batches();
    assert!(batches.len() >= 2, "expected size-triggered batches, got {batches:?}");
    assert!(batches.len() <= ENTRIES.div_ceil(BATCH_SIZE));
    assert!(batches.iter().all(|batch| !batch.is_empty()));

    // Concatenated in dispatch order, the batches give back the append order,
    // so each one is a contiguous run.
    let mut next = 0;
    for batch in &batches {
        assert_eq!(batch.as_slice(), &expected[next..next + batch.len()]);
        next += batch.len();
    }
    assert_eq!(next, ENTRIES);
}

#[tokio::test]
async fn test_panicking_transport_drops_batches_and_still_terminates() {
    let transport = Arc::new(PanickingTransport::default());
    let handle = LokiShipper::start(test_config(1, Duration::from_secs(60)), transport.clone())
        .unwrap();

    handle.append("first").unwrap();
    timeout(Duration::from_secs(2), async {
        while transport.calls() < 1 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    handle.append("second").unwrap();
    timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .unwrap();

    assert_eq!(handle.state(), DispatcherState::Terminated);
    assert_eq!(handle.pending(), 0);
    let stats = handle.stats();
    assert_eq!(stats.batches_failed, 2);
    assert_eq!(stats.entries_dropped, 2);
    assert_eq!(stats.batches_sent, 0);
    assert!(matches!(
        handle.append("after"),
        Err(ShipperError::Terminated)
    ));
}

//! Multi-threaded producers, consumers and subscription churn.

use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use typebus::{BroadcastError, Broadcaster, SubscriptionConfig, TerminationReason};

const PRODUCERS: usize = 8;
const PER_PRODUCER: u64 = 2_000;

#[derive(Clone, Debug, PartialEq)]
struct Tick {
    producer: usize,
    seq: u64,
}

#[test]
fn test_concurrent_producers_keep_per_producer_order() {
    let bus = Broadcaster::new();
    let subs: Vec<_> = (0..3).map(|_| bus.subscribe::<Tick>()).collect();
    let barrier = Arc::new(Barrier::new(PRODUCERS));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let bus = bus.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for seq in 0..PER_PRODUCER {
                    bus.post(Tick { producer, seq });
                    // Unrelated traffic interleaved on the same registry.
                    bus.post(seq);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for sub in &subs {
        let mut next = vec![0u64; PRODUCERS];
        let mut total = 0;
        for tick in sub.try_iter() {
            assert_eq!(tick.seq, next[tick.producer], "out of order for {:?}", tick);
            next[tick.producer] += 1;
            total += 1;
        }
        assert_eq!(total, PRODUCERS as u64 * PER_PRODUCER);
    }
}

#[test]
fn test_consumers_on_their_own_threads() {
    let bus = Broadcaster::new();
    let mut consumers = Vec::new();
    let mut cancellers = Vec::new();
    for _ in 0..4 {
        let sub = bus.subscribe::<u64>();
        cancellers.push(sub.canceller());
        consumers.push(thread::spawn(move || sub.sum::<u64>()));
    }

    for i in 1..=1000u64 {
        bus.post(i);
    }
    for canceller in &cancellers {
        canceller.cancel();
    }

    for consumer in consumers {
        assert_eq!(consumer.join().unwrap(), 500_500);
    }
    assert_eq!(bus.subscription_count(), 0);
}

#[test]
fn test_subscription_churn_leaves_registry_empty() {
    let bus = Broadcaster::new();
    let barrier = Arc::new(Barrier::new(5));

    let poster = {
        let bus = bus.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            for i in 0..5_000u32 {
                bus.post(i);
            }
        })
    };

    let churners: Vec<_> = (0..4)
        .map(|n| {
            let bus = bus.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..500 {
                    let sub = if n % 2 == 0 {
                        bus.subscribe::<u32>()
                    } else {
                        bus.subscribe_with::<u32>(SubscriptionConfig::bounded(2)).unwrap()
                    };
                    let _ = sub.recv_timeout(Duration::from_micros(10));
                }
            })
        })
        .collect();

    poster.join().unwrap();
    for churner in churners {
        churner.join().unwrap();
    }

    assert_eq!(bus.subscription_count(), 0);
    assert_eq!(bus.type_count(), 0);
}

#[test]
fn test_no_delivery_after_cancel_under_concurrent_posts() {
    for _ in 0..20 {
        let bus = Broadcaster::new();
        let sub = bus.subscribe::<u64>();
        let stop = Arc::new(AtomicBool::new(false));

        let posters: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                let stop = stop.clone();
                thread::spawn(move || {
                    let mut i = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        bus.post(i);
                        i += 1;
                    }
                })
            })
            .collect();

        while sub.is_empty() {
            thread::yield_now();
        }
        sub.cancel();
        let buffered = sub.len();

        // Posters are still running against the same broadcaster.
        thread::sleep(Duration::from_millis(2));
        assert_eq!(sub.len(), buffered, "value enqueued after cancel returned");

        stop.store(true, Ordering::Relaxed);
        for poster in posters {
            poster.join().unwrap();
        }

        assert_eq!(sub.try_iter().count(), buffered);
        assert_eq!(
            sub.try_recv(),
            Err(BroadcastError::Terminated {
                id: sub.id(),
                reason: TerminationReason::Cancelled,
            })
        );
    }
}

#[derive(Clone, Debug)]
enum Posted {
    Number(i64),
    Text(String),
}

proptest! {
    #[test]
    fn prop_fifo_and_type_isolation(posts in prop::collection::vec(
        prop_oneof![
            any::<i64>().prop_map(Posted::Number),
            "[a-z]{0,8}".prop_map(Posted::Text),
        ],
        0..200,
    )) {
        let bus = Broadcaster::new();
        let numbers = bus.subscribe::<i64>();
        let texts = bus.subscribe::<String>();

        for post in &posts {
            match post {
                Posted::Number(n) => bus.post(*n),
                Posted::Text(s) => bus.post(s.clone()),
            }
        }

        let expected_numbers: Vec<i64> = posts.iter().filter_map(|p| match p {
            Posted::Number(n) => Some(*n),
            Posted::Text(_) => None,
        }).collect();
        let expected_texts: Vec<String> = posts.iter().filter_map(|p| match p {
            Posted::Text(s) => Some(s.clone()),
            Posted::Number(_) => None,
        }).collect();

        prop_assert_eq!(numbers.try_iter().collect::<Vec<_>>(), expected_numbers);
        prop_assert_eq!(texts.try_iter().collect::<Vec<_>>(), expected_texts);
    }

    #[test]
    fn prop_fan_out_exactly_once(subscribers in 1usize..16, value in any::<u32>()) {
        let bus = Broadcaster::new();
        let subs: Vec<_> = (0..subscribers).map(|_| bus.subscribe::<u32>()).collect();

        bus.post(value);

        for sub in &subs {
            prop_assert_eq!(sub.try_iter().collect::<Vec<_>>(), vec![value]);
        }
        prop_assert_eq!(bus.stats().delivered, subscribers as u64);
    }

    #[test]
    fn prop_cancelled_subset_stops_receiving(
        subscribers in 1usize..12,
        cancel_mask in any::<u16>(),
    ) {
        let bus = Broadcaster::new();
        let subs: Vec<_> = (0..subscribers).map(|_| bus.subscribe::<u8>()).collect();

        let mut kept = 0;
        for (i, sub) in subs.iter().enumerate() {
            if cancel_mask & (1 << i) != 0 {
                sub.cancel();
            } else {
                kept += 1;
            }
        }
        bus.post(1u8);

        for (i, sub) in subs.iter().enumerate() {
            let expected = if cancel_mask & (1 << i) != 0 { 0 } else { 1 };
            prop_assert_eq!(sub.try_iter().count(), expected);
        }
        prop_assert_eq!(bus.subscriber_count::<u8>(), kept);
    }
}

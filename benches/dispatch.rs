//! Event fan-out benchmark suite.
//!
//! Measures dispatch cost per event across subscription counts and
//! delivery modes:
//! - Subscriber counts: 1, 10, 100
//! - Modes: synchronous, sequential, concurrent
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use hass_link::dispatch::{Delivery, EventDispatcher, EventFilter};
use hass_link::{ConnectionId, HassEvent, ServerEvent};
use serde_json::json;
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SUBSCRIBER_COUNTS: &[usize] = &[1, 10, 100];
const EVENTS_PER_ITER: usize = 100;

// ============================================================================
// Helpers
// ============================================================================

fn state_changed(n: usize) -> ServerEvent {
    ServerEvent::Event(HassEvent::new(
        "state_changed",
        json!({
            "entity_id": "sensor.bench",
            "new_state": { "entity_id": "sensor.bench", "state": n.to_string() }
        }),
    ))
}

fn live_dispatcher() -> (EventDispatcher, ConnectionId) {
    let dispatcher = EventDispatcher::default();
    let epoch = ConnectionId::from_u64(1).expect("non-zero epoch");
    dispatcher.begin_epoch(epoch);
    (dispatcher, epoch)
}

async fn wait_for(counter: &AtomicUsize, target: usize) {
    while counter.load(Ordering::Relaxed) < target {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Benchmark: Synchronous Fan-out
// ============================================================================

fn bench_synchronous(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_synchronous");
    group.throughput(Throughput::Elements(EVENTS_PER_ITER as u64));

    for &count in SUBSCRIBER_COUNTS {
        let (dispatcher, epoch) = live_dispatcher();
        let delivered = Arc::new(AtomicUsize::new(0));
        for _ in 0..count {
            let delivered = Arc::clone(&delivered);
            dispatcher.subscribe(
                EventFilter::entity("sensor.bench"),
                Delivery::synchronous(move |_| {
                    delivered.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
            );
        }

        group.bench_with_input(BenchmarkId::new("subscribers", count), &count, |b, _| {
            b.iter(|| {
                for n in 0..EVENTS_PER_ITER {
                    dispatcher.dispatch(epoch, state_changed(n));
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Async Fan-out
// ============================================================================

fn bench_async(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("dispatch_async");
    group.throughput(Throughput::Elements(EVENTS_PER_ITER as u64));
    group.measurement_time(Duration::from_secs(10));

    for mode in ["sequential", "concurrent"] {
        for &count in SUBSCRIBER_COUNTS {
            let (dispatcher, epoch) = live_dispatcher();
            let delivered = Arc::new(AtomicUsize::new(0));
            for _ in 0..count {
                let delivered = Arc::clone(&delivered);
                let callback = move |_: ServerEvent| {
                    let delivered = Arc::clone(&delivered);
                    async move {
                        delivered.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                };
                let delivery = if mode == "sequential" {
                    Delivery::sequential(callback)
                } else {
                    Delivery::concurrent(callback, None)
                };
                dispatcher.subscribe(EventFilter::All, delivery);
            }

            group.bench_with_input(BenchmarkId::new(mode, count), &count, |b, &count| {
                b.to_async(&rt).iter(|| {
                    let dispatcher = dispatcher.clone();
                    let delivered = Arc::clone(&delivered);
                    async move {
                        let target = delivered.load(Ordering::Relaxed) + count * EVENTS_PER_ITER;
                        for n in 0..EVENTS_PER_ITER {
                            dispatcher.dispatch(epoch, state_changed(n));
                        }
                        wait_for(&delivered, target).await;
                    }
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_synchronous, bench_async);
criterion_main!(benches);

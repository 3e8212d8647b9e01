//! Integration tests for the five admission strategies.
//!
//! Exercises the documented algorithm properties end to end: capacity
//! bounds, window resets, trailing-window exactness, drain recovery,
//! feedback steering, concurrent admission under contention, and the
//! background reaper lifecycle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::init_tracing;
use rate_gate::{
    AdaptiveStrategy, FixedWindowStrategy, LeakyBucketStrategy, RateLimitStrategy,
    SlidingWindowStrategy, TokenBucketStrategy,
};

#[test]
fn token_bucket_exhausts_then_refills() {
    init_tracing();
    let strategy =
        TokenBucketStrategy::with_cleanup_interval(2, Duration::from_millis(300), None);

    assert!(strategy.allow("x").allowed);
    assert!(strategy.allow("x").allowed);

    let rejected = strategy.allow("x");
    assert!(!rejected.allowed);
    assert!(rejected.retry_after > Duration::ZERO);

    // Past the refill window the bucket is full again.
    std::thread::sleep(Duration::from_millis(350));
    let recovered = strategy.allow("x");
    assert!(recovered.allowed);
    assert_eq!(recovered.retry_after, Duration::ZERO);
}

#[test]
fn fixed_window_admits_exactly_limit_per_window() {
    init_tracing();
    let strategy = FixedWindowStrategy::with_cleanup_interval(5, Duration::from_secs(60), None);

    let admitted = (0..20).filter(|_| strategy.allow("x").allowed).count();
    assert_eq!(admitted, 5);
}

#[test]
fn sliding_window_holds_bound_for_any_trailing_interval() {
    init_tracing();
    let window = Duration::from_millis(100);
    let strategy = SlidingWindowStrategy::with_cleanup_interval(4, window, None);

    // Fire an irregular burst pattern and track admissions ourselves;
    // at no observation point may the trailing window hold more than
    // the limit. The tracked interval is 10ms shorter than the
    // strategy's so scheduling skew between the two clock reads can
    // never make the external count a superset of the strategy's.
    let tracked = window - Duration::from_millis(10);
    let mut admitted: Vec<std::time::Instant> = Vec::new();
    for round in 0..50 {
        let now = std::time::Instant::now();
        if strategy.allow("x").allowed {
            admitted.push(now);
        }
        admitted.retain(|t| now.duration_since(*t) <= tracked);
        assert!(
            admitted.len() <= 4,
            "trailing window exceeded limit at round {round}"
        );
        std::thread::sleep(Duration::from_millis(if round % 7 == 0 { 11 } else { 2 }));
    }
}

#[test]
fn leaky_bucket_admits_one_more_after_one_leak_interval() {
    init_tracing();
    // 4 units/s: one unit leaks every 250ms.
    let strategy = LeakyBucketStrategy::with_cleanup_interval(4.0, 3, None);

    for _ in 0..3 {
        assert!(strategy.allow("x").allowed);
    }
    let rejected = strategy.allow("x");
    assert!(!rejected.allowed);
    assert_eq!(rejected.retry_after, Duration::from_millis(250));

    std::thread::sleep(Duration::from_millis(300));
    assert!(strategy.allow("x").allowed);
    assert!(!strategy.allow("x").allowed);
}

#[test]
fn adaptive_feedback_steers_rate_between_bounds() {
    init_tracing();
    let strategy =
        AdaptiveStrategy::with_cleanup_interval(1.0, 0.25, 4.0, Duration::from_secs(60), None);
    strategy.allow("x");

    // Strictly increasing under good feedback, up to the cap.
    let mut previous = strategy.current_rate("x").unwrap();
    for _ in 0..30 {
        strategy.update_rate("x", true);
        let current = strategy.current_rate("x").unwrap();
        assert!(current >= previous);
        assert!(current <= 4.0);
        previous = current;
    }
    assert!((previous - 4.0).abs() < f64::EPSILON);

    // Strictly decreasing under bad feedback, down to the floor.
    for _ in 0..30 {
        strategy.update_rate("x", false);
        let current = strategy.current_rate("x").unwrap();
        assert!(current <= previous);
        assert!(current >= 0.25);
        previous = current;
    }
    assert!((previous - 0.25).abs() < f64::EPSILON);
}

#[test]
fn adaptive_rejection_reports_remaining_interval() {
    init_tracing();
    let strategy =
        AdaptiveStrategy::with_cleanup_interval(1.0, 0.1, 10.0, Duration::from_secs(60), None);

    assert!(strategy.allow("x").allowed);
    let rejected = strategy.allow("x");
    assert!(!rejected.allowed);
    assert!(rejected.retry_after > Duration::ZERO);
    assert!(rejected.retry_after <= Duration::from_secs(1));
}

#[test]
fn strategies_never_over_admit_under_contention() {
    init_tracing();
    let strategy = Arc::new(TokenBucketStrategy::with_cleanup_interval(
        64,
        Duration::from_secs(60),
        None,
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let strategy = Arc::clone(&strategy);
            std::thread::spawn(move || {
                (0..64).filter(|_| strategy.allow("hot").allowed).count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 64);
}

#[test]
fn different_keys_are_limited_independently() {
    init_tracing();
    let strategy = FixedWindowStrategy::with_cleanup_interval(1, Duration::from_secs(60), None);

    assert!(strategy.allow("10.0.0.1").allowed);
    assert!(!strategy.allow("10.0.0.1").allowed);
    assert!(strategy.allow("10.0.0.2").allowed);
    assert_eq!(strategy.tracked_keys(), 2);
}

#[tokio::test]
async fn reaper_evicts_stale_entries_in_background() {
    init_tracing();
    let strategy = TokenBucketStrategy::with_cleanup_interval(
        1,
        Duration::from_millis(10),
        Some(Duration::from_millis(25)),
    );

    strategy.allow("a");
    strategy.allow("b");
    assert_eq!(strategy.tracked_keys(), 2);

    // Entries expire after 10ms + a 10ms grace window; the reaper
    // passes every 25ms.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(strategy.tracked_keys(), 0);

    strategy.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_idempotent_and_stops_sweeping() {
    init_tracing();
    let strategy = SlidingWindowStrategy::with_cleanup_interval(
        2,
        Duration::from_millis(10),
        Some(Duration::from_millis(20)),
    );

    strategy.allow("a");
    strategy.shutdown().await;
    strategy.shutdown().await;

    // With the reaper stopped, the stale entry stays until someone
    // sweeps explicitly.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(strategy.tracked_keys(), 1);
    assert_eq!(strategy.sweep(), 1);
}

#[test]
fn trait_objects_dispatch_all_five_algorithms() {
    init_tracing();
    let strategies: Vec<Arc<dyn RateLimitStrategy>> = vec![
        Arc::new(TokenBucketStrategy::with_cleanup_interval(
            2,
            Duration::from_secs(60),
            None,
        )),
        Arc::new(FixedWindowStrategy::with_cleanup_interval(
            2,
            Duration::from_secs(60),
            None,
        )),
        Arc::new(SlidingWindowStrategy::with_cleanup_interval(
            2,
            Duration::from_secs(60),
            None,
        )),
        Arc::new(LeakyBucketStrategy::with_cleanup_interval(1.0, 2, None)),
        Arc::new(AdaptiveStrategy::with_cleanup_interval(
            1.0,
            0.1,
            10.0,
            Duration::from_secs(60),
            None,
        )),
    ];

    let names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        vec![
            "token_bucket",
            "fixed_window",
            "sliding_window",
            "leaky_bucket",
            "adaptive"
        ]
    );

    for strategy in &strategies {
        assert!(
            strategy.allow("k").allowed,
            "{} must admit a fresh key",
            strategy.name()
        );
    }
}

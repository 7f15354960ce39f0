use cms_portal::{SessionThrottle, throttle::SWEEP_EVERY};
use std::time::Duration;

const LOCKOUT: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn test_locks_after_five_failures() {
    let throttle = SessionThrottle::new(5, LOCKOUT);
    let key = SessionThrottle::key("user@example.com", "10.0.0.1");

    for attempt in 1..=4 {
        assert_eq!(throttle.record_failure(&key), attempt);
        assert!(!throttle.too_many_attempts(&key), "locked early at {attempt}");
    }
    throttle.record_failure(&key);

    assert!(throttle.too_many_attempts(&key));
    assert_eq!(throttle.available_in(&key), LOCKOUT);
}

#[tokio::test(start_paused = true)]
async fn test_clear_unlocks_immediately() {
    let throttle = SessionThrottle::new(5, LOCKOUT);
    let key = SessionThrottle::key("user@example.com", "10.0.0.1");
    for _ in 0..5 {
        throttle.record_failure(&key);
    }

    throttle.clear(&key);

    assert!(!throttle.too_many_attempts(&key));
    assert_eq!(throttle.available_in(&key), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_lockout_expires_after_window() {
    let throttle = SessionThrottle::new(5, LOCKOUT);
    let key = SessionThrottle::key("user@example.com", "10.0.0.1");
    for _ in 0..5 {
        throttle.record_failure(&key);
    }

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(throttle.too_many_attempts(&key));
    assert_eq!(throttle.available_in(&key), Duration::from_secs(1));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!throttle.too_many_attempts(&key));
    // A fresh window starts counting from one.
    assert_eq!(throttle.record_failure(&key), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_outside_window_do_not_accumulate() {
    let throttle = SessionThrottle::new(5, LOCKOUT);
    let key = SessionThrottle::key("user@example.com", "10.0.0.1");
    for _ in 0..4 {
        throttle.record_failure(&key);
    }

    tokio::time::advance(LOCKOUT).await;

    assert_eq!(throttle.record_failure(&key), 1);
    assert!(!throttle.too_many_attempts(&key));
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent_per_origin_and_case_insensitive_email() {
    let throttle = SessionThrottle::new(5, LOCKOUT);
    let home = SessionThrottle::key("User@Example.com", "10.0.0.1");
    let office = SessionThrottle::key("user@example.com", "10.0.0.2");
    for _ in 0..5 {
        throttle.record_failure(&home);
    }

    assert!(throttle.too_many_attempts(&SessionThrottle::key("user@example.com", "10.0.0.1")));
    assert!(!throttle.too_many_attempts(&office));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failures_are_all_counted() {
    let throttle = SessionThrottle::new(50, LOCKOUT);
    let key = SessionThrottle::key("race@example.com", "10.0.0.9");

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let throttle = throttle.clone();
            let key = key.clone();
            tokio::spawn(async move { throttle.record_failure(&key) })
        })
        .collect();
    let mut counts = Vec::new();
    for handle in handles {
        counts.push(handle.await.unwrap());
    }
    counts.sort_unstable();

    assert_eq!(counts, (1..=50).collect::<Vec<u32>>());
    assert!(throttle.too_many_attempts(&key));
}

#[tokio::test(start_paused = true)]
async fn test_sweep_drops_elapsed_windows_and_keeps_lockouts() {
    let throttle = SessionThrottle::new(5, LOCKOUT);
    for i in 0..3 {
        let key = SessionThrottle::key("once@example.com", &format!("10.0.1.{i}"));
        throttle.record_failure(&key);
    }
    tokio::time::advance(Duration::from_secs(30)).await;
    let locked = SessionThrottle::key("locked@example.com", "10.0.0.1");
    for _ in 0..5 {
        throttle.record_failure(&locked);
    }

    tokio::time::advance(Duration::from_secs(30)).await;

    assert_eq!(throttle.sweep_expired(), 3);
    assert_eq!(throttle.tracked_keys(), 1);
    assert!(throttle.too_many_attempts(&locked));
}

#[tokio::test(start_paused = true)]
async fn test_one_off_failures_do_not_accumulate() {
    let throttle = SessionThrottle::new(5, LOCKOUT);
    for i in 0..SWEEP_EVERY / 2 {
        let key = SessionThrottle::key("spray@example.com", &format!("origin-{i}"));
        throttle.record_failure(&key);
    }
    assert_eq!(throttle.tracked_keys() as u64, SWEEP_EVERY / 2);

    tokio::time::advance(LOCKOUT).await;
    // The remaining failures land on one fresh key and trigger a sweep.
    let fresh = SessionThrottle::key("spray@example.com", "origin-fresh");
    for _ in 0..SWEEP_EVERY - SWEEP_EVERY / 2 {
        throttle.record_failure(&fresh);
    }

    assert_eq!(throttle.tracked_keys(), 1);
}

use locker::{Locker, LockerError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_lock_has_one_winner() {
    const THREADS: usize = 16;

    for round in 0..20 {
        let locker: Locker<String, usize> = Locker::new().unwrap();
        let barrier = Arc::new(Barrier::new(THREADS));
        let wins = Arc::new(AtomicUsize::new(0));
        let rejections = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|id| {
                let locker = locker.clone();
                let barrier = Arc::clone(&barrier);
                let wins = Arc::clone(&wins);
                let rejections = Arc::clone(&rejections);
                thread::spawn(move || {
                    barrier.wait();
                    match locker.lock(format!("resource-{}", round), id, Duration::from_secs(5)) {
                        Ok(()) => {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(LockerError::LockExists) => {
                            rejections.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1, "Exactly one locker should win");
        assert_eq!(rejections.load(Ordering::SeqCst), THREADS - 1);
    }
}

#[test]
fn test_only_owner_can_unlock_under_contention() {
    const THREADS: usize = 8;

    let locker: Locker<&'static str, usize> = Locker::new().unwrap();
    locker.lock("shared", 3, Duration::from_secs(5)).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let released = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|secret| {
            let locker = locker.clone();
            let barrier = Arc::clone(&barrier);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                barrier.wait();
                match locker.unlock(&"shared", &secret) {
                    Ok(true) => {
                        released.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(false) => panic!("unlock never reports false"),
                    Err(e) => assert!(
                        matches!(e, LockerError::InvalidSecret | LockerError::InvalidKey),
                        "unexpected error: {}",
                        e
                    ),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(!locker.status(&"shared"));
}

#[test]
fn test_mixed_operations_with_expiry_do_not_deadlock() {
    let locker: Locker<u32, u32> = Locker::new().unwrap();

    let handles: Vec<_> = (0..4u32)
        .map(|worker| {
            let locker = locker.clone();
            thread::spawn(move || {
                for i in 0..200u32 {
                    let key = i % 10;
                    let _ = locker.lock(key, worker, Duration::from_millis(u64::from(i % 5)));
                    let _ = locker.reset(&key, &worker);
                    let _ = locker.status(&key);
                    let _ = locker.unlock(&key, &worker);
                    if i % 7 == 0 {
                        locker.remove(&key);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Whatever is left has at most 4ms to live
    thread::sleep(Duration::from_millis(200));
    assert!(locker.is_empty());
}

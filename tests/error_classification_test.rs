use locker::LockerError;
use std::error::Error;
use std::io;

#[test]
fn test_invalid_key_is_stale() {
    let err = LockerError::InvalidKey;
    assert!(err.is_stale());
    assert!(!err.is_rejected());
}

#[test]
fn test_contention_is_rejected() {
    assert!(LockerError::LockExists.is_rejected());
    assert!(LockerError::InvalidSecret.is_rejected());
    assert!(!LockerError::LockExists.is_stale());
}

#[test]
fn test_messages() {
    assert_eq!(LockerError::LockExists.to_string(), "lock already exists");
    assert_eq!(LockerError::InvalidKey.to_string(), "invalid key");
    assert_eq!(LockerError::InvalidSecret.to_string(), "invalid secret");
}

#[test]
fn test_timer_spawn_keeps_source() {
    let err = LockerError::TimerSpawn(io::Error::new(io::ErrorKind::Other, "no threads"));
    assert!(err.to_string().contains("timer thread"));
    assert!(err.source().is_some());
    assert!(!err.is_stale() && !err.is_rejected());
}

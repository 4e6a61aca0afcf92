//! Cross-process locking behavior, exercised through two independent
//! service instances sharing one lock directory.

use std::time::Duration;
use tapedeck_importer::locking::{FileLockService, LockError, LockService};

#[test]
fn test_contention_across_service_instances() {
    let dir = tempfile::tempdir().unwrap();
    let a = FileLockService::new(dir.path()).unwrap();
    let b = FileLockService::new(dir.path()).unwrap();

    let token = a.acquire("download", "artistX", Duration::ZERO).unwrap();

    // Same (operation, entity) from another instance fails immediately
    match b.acquire("download", "artistX", Duration::ZERO) {
        Err(LockError::Contended { operation, entity }) => {
            assert_eq!(operation, "download");
            assert_eq!(entity, "artistX");
        }
        other => panic!("expected contention, got {:?}", other.map(|_| ())),
    }

    // Different operation or entity is unaffected
    let other_op = b.acquire("import", "artistX", Duration::ZERO).unwrap();
    let other_entity = b.acquire("download", "artistY", Duration::ZERO).unwrap();

    a.release(&token).unwrap();
    b.release(&other_op).unwrap();
    b.release(&other_entity).unwrap();

    // Released lock is reacquirable by the other instance
    let token = b.acquire("download", "artistX", Duration::ZERO).unwrap();
    b.release(&token).unwrap();
}

#[test]
fn test_release_requires_matching_token() {
    let dir = tempfile::tempdir().unwrap();
    let a = FileLockService::new(dir.path()).unwrap();
    let b = FileLockService::new(dir.path()).unwrap();

    let token = a.acquire("import", "gd", Duration::ZERO).unwrap();

    // A different instance holding a forged token must not clear the lock
    let mut forged = token.clone();
    forged.token = "forged".to_string();
    assert!(matches!(b.release(&forged), Err(LockError::NotOwner { .. })));

    // The real holder still releases fine
    a.release(&token).unwrap();
}

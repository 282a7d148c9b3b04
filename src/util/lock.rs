//! Lock helpers that recover from poisoning instead of panicking.
//!
//! Cached query results and session state stay usable after a panic in an
//! unrelated task; the recovery is logged so stale state can be traced.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(
    poisoned: PoisonError<G>,
    target: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    warn!(
        op,
        target_module = target,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned lock"
    );
    poisoned.into_inner()
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, target, op, "rwlock.read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, target, op, "rwlock.write"))
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, target, op, "mutex.lock"))
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_mutex_is_recovered() {
        let lock = Mutex::new(1_u32);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("first lock");
            panic!("poison");
        }));

        *mutex_lock(&lock, "util::lock", "test") += 1;
        assert_eq!(*mutex_lock(&lock, "util::lock", "test"), 2);
    }

    #[test]
    fn poisoned_rwlock_is_recovered() {
        let lock = RwLock::new(String::from("a"));
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("first lock");
            panic!("poison");
        }));

        rw_write(&lock, "util::lock", "test").push('b');
        assert_eq!(rw_read(&lock, "util::lock", "test").as_str(), "ab");
    }
}

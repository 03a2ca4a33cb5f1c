use {
    crate::{Acquisition, Padlock, owner::current_owner},
    parking_lot::lock_api::RawMutex,
    std::{
        collections::HashSet,
        mem,
        sync::{Barrier, atomic::Ordering::Relaxed},
        thread,
    },
};

fn assert_idle(lock: &Padlock) {
    assert_eq!(lock.shared.owner.load(Relaxed), 0);
    assert_eq!(lock.shared.depth.get(), 0);
    assert_eq!(lock.shared.raw_mutex.is_locked(), false);
}

fn run_in_thread<T: Send>(f: impl FnOnce() -> T + Send) -> T {
    thread::scope(|s| s.spawn(|| f()).join().unwrap())
}

#[test]
fn new() {
    let lock = Padlock::new();
    assert_idle(&lock);
    assert_eq!(lock.name(), format!("Padlock-{}", lock.id()));
}

#[test]
fn default_is_auto_named() {
    let lock = Padlock::default();
    assert!(lock.name().starts_with("Padlock-"));
}

#[test]
fn named() {
    let lock = Padlock::named("inventory");
    assert_eq!(lock.name(), "inventory");
    assert_idle(&lock);
}

#[test]
fn ids_are_unique() {
    let ids: HashSet<_> = (0..100).map(|_| Padlock::new().id()).collect();
    assert_eq!(ids.len(), 100);
    let names: HashSet<_> = (0..100).map(|_| Padlock::new().name().to_owned()).collect();
    assert_eq!(names.len(), 100);
}

#[test]
fn duplicate_names() {
    let lock1 = Padlock::named("same");
    let lock2 = Padlock::named("same");
    assert_eq!(lock1.name(), lock2.name());
    assert_ne!(lock1.id(), lock2.id());
    assert_ne!(lock1, lock2);
}

#[test]
fn is_locked() {
    let lock = Padlock::new();
    let acquisition = lock.acquire();
    assert_eq!(lock.is_locked(), true);
    drop(acquisition);
    assert_eq!(lock.is_locked(), false);
}

#[test]
fn is_held_by_current_thread() {
    let lock = Padlock::new();
    assert_eq!(lock.is_held_by_current_thread(), false);
    run_in_thread(|| {
        assert_eq!(lock.is_held_by_current_thread(), false);
    });
    {
        let _acquisition = lock.acquire();
        assert_eq!(lock.is_held_by_current_thread(), true);
        run_in_thread(|| {
            assert_eq!(lock.is_held_by_current_thread(), false);
        });
    }
    assert_eq!(lock.is_held_by_current_thread(), false);
    let barrier1 = Barrier::new(2);
    let barrier2 = Barrier::new(2);
    thread::scope(|s| {
        let handle = s.spawn(|| {
            let _acquisition = lock.acquire();
            assert_eq!(lock.is_held_by_current_thread(), true);
            barrier1.wait();
            barrier2.wait();
        });
        barrier1.wait();
        assert_eq!(lock.is_locked(), true);
        assert_eq!(lock.is_held_by_current_thread(), false);
        assert!(lock.try_acquire().is_none());
        barrier2.wait();
        handle.join().unwrap();
    });
    assert_idle(&lock);
}

#[test]
fn acquire() {
    let lock = Padlock::new();
    run_in_thread(|| {
        assert!(lock.try_acquire().is_some());
    });
    let acquisition1 = lock.acquire();
    assert_eq!(lock.shared.owner.load(Relaxed), current_owner());
    assert_eq!(lock.depth(), 1);
    run_in_thread(|| {
        assert!(lock.try_acquire().is_none());
        assert_eq!(lock.depth(), 0);
    });
    let acquisition2 = lock.acquire();
    assert_eq!(lock.shared.owner.load(Relaxed), current_owner());
    assert_eq!(lock.depth(), 2);
    run_in_thread(|| {
        assert!(lock.try_acquire().is_none());
    });
    drop(acquisition2);
    assert_eq!(lock.shared.owner.load(Relaxed), current_owner());
    assert_eq!(lock.depth(), 1);
    run_in_thread(|| {
        assert!(lock.try_acquire().is_none());
    });
    drop(acquisition1);
    assert_idle(&lock);
    run_in_thread(|| {
        assert!(lock.try_acquire().is_some());
    });
}

#[test]
fn acquire_blocks_until_released() {
    let lock = Padlock::new();
    let barrier = Barrier::new(2);
    thread::scope(|s| {
        let acquisition = lock.acquire();
        let handle = s.spawn(|| {
            barrier.wait();
            let _acquisition = lock.acquire();
            assert!(lock.is_held_by_current_thread());
        });
        barrier.wait();
        assert!(lock.is_held_by_current_thread());
        drop(acquisition);
        handle.join().unwrap();
    });
    assert_idle(&lock);
}

#[test]
fn try_acquire() {
    let lock = Padlock::new();
    assert!(lock.try_acquire().is_some());
    run_in_thread(|| {
        assert!(lock.try_acquire().is_some());
    });
    let acquisition = lock.acquire();
    assert!(lock.try_acquire().is_some());
    run_in_thread(|| {
        assert!(lock.try_acquire().is_none());
    });
    drop(acquisition);
    assert!(lock.try_acquire().is_some());
    assert_idle(&lock);
}

#[test]
fn reenter() {
    let lock = Padlock::new();
    assert!(lock.reenter().is_none());
    assert_idle(&lock);
    let _acquisition = lock.acquire();
    let inner = lock.reenter();
    assert!(inner.is_some());
    assert_eq!(lock.depth(), 2);
    run_in_thread(|| {
        assert!(lock.reenter().is_none());
    });
}

#[test]
fn release_level_after_forget() {
    let lock = Padlock::new();
    mem::forget(lock.acquire());
    assert_eq!(lock.depth(), 1);
    unsafe {
        lock.release_level();
    }
    assert_idle(&lock);
}

fn release_test(mut release: impl FnMut(Acquisition<'_>)) {
    let lock = Padlock::new();
    let acquisition = lock.acquire();
    run_in_thread(|| {
        assert!(lock.try_acquire().is_none());
    });
    release(acquisition);
    assert_idle(&lock);
    let acquisition1 = lock.acquire();
    let acquisition2 = lock.acquire();
    release(acquisition1);
    run_in_thread(|| {
        assert!(lock.try_acquire().is_none());
    });
    release(acquisition2);
    run_in_thread(|| {
        assert!(lock.try_acquire().is_some());
    });
    assert_idle(&lock);
}

#[test]
fn drop_acquisition() {
    release_test(|acquisition| drop(acquisition));
}

#[test]
fn release() {
    release_test(|acquisition| acquisition.release());
}

#[test]
fn recursive_depth() {
    fn recurse(lock: &Padlock, level: u64) {
        if level == 0 {
            return;
        }
        let _acquisition = lock.acquire();
        assert_eq!(lock.depth(), 6 - level);
        recurse(lock, level - 1);
    }
    let lock = Padlock::new();
    recurse(&lock, 5);
    assert_idle(&lock);
    run_in_thread(|| {
        let _acquisition = lock.acquire();
        assert_eq!(lock.depth(), 1);
    });
}

#[test]
fn unlocked() {
    let lock = Padlock::new();
    let assert_free = || {
        run_in_thread(|| {
            assert!(lock.try_acquire().is_some());
        });
    };
    let assert_taken = || {
        run_in_thread(|| {
            assert!(lock.try_acquire().is_none());
        });
    };
    let mut acquisition = lock.acquire();
    acquisition.unlocked(|| {
        assert_free();
    });
    assert_taken();
    drop(acquisition);
    assert_free();
    let mut acquisition1 = lock.acquire();
    let mut acquisition2 = lock.acquire();
    acquisition1.unlocked(|| {
        assert_taken();
        acquisition2.unlocked(|| {
            assert_free();
        });
        assert_taken();
    });
    drop(acquisition1);
    drop(acquisition2);
    assert_idle(&lock);
}

#[test]
fn unlocked_reacquires_after_panic() {
    let lock = Padlock::new();
    let mut acquisition = lock.acquire();
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        acquisition.unlocked(|| {
            if lock.depth() == 0 {
                panic!("boom");
            }
        });
    }));
    assert!(res.is_err());
    assert_eq!(lock.depth(), 1);
    drop(acquisition);
    assert_idle(&lock);
}

#[test]
fn acquisition_lock() {
    let lock = Padlock::new();
    let acquisition = lock.acquire();
    assert_eq!(acquisition.lock(), &lock);
}

#[test]
fn clone_shares_state() {
    let lock = Padlock::new();
    let clone = lock.clone();
    assert_eq!(lock, clone);
    let _acquisition = clone.acquire();
    assert!(lock.is_held_by_current_thread());
    assert_eq!(lock.depth(), 1);
}

#[test]
fn eq() {
    let lock1 = Padlock::new();
    let lock2 = Padlock::new();
    assert_eq!(lock1, lock1);
    assert_ne!(lock1, lock2);
    assert_eq!(lock2, lock2);
}

#[test]
fn hash() {
    let lock = Padlock::new();
    let set: HashSet<_> = [lock.clone(), lock.clone(), Padlock::new()].into_iter().collect();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&lock));
}

#[test]
fn debug() {
    let lock = Padlock::named("debugged");
    assert!(format!("{lock:?}").contains("debugged"));
    let acquisition = lock.acquire();
    assert!(format!("{acquisition:?}").contains("debugged"));
}

#[cfg(doc)]
use crate::GuardedValue;
use {
    crate::owner::current_owner,
    log::trace,
    opera::{PhantomNotSend, PhantomNotSync},
    parking_lot::{RawMutex, lock_api::RawMutex as RawMutexTrait},
    run_on_drop::on_drop,
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{
        cell::Cell,
        fmt::{Debug, Formatter},
        hash::{Hash, Hasher},
        mem::{self, ManuallyDrop},
        ptr,
        sync::{
            Arc,
            atomic::{AtomicU64, AtomicUsize, Ordering::Relaxed},
        },
    },
};

#[cfg(test)]
mod tests;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A named, re-entrant lock that can guard any number of values.
///
/// Holding the lock gives the current thread access to every [`GuardedValue`] that
/// lists it as a guardian. Cloning a [`Padlock`] creates another handle to the same
/// lock.
///
/// The lock does not detect deadlocks. Threads that acquire several padlocks must do
/// so in a consistent order.
///
/// # Example
///
/// ```
/// use padlock::Padlock;
///
/// let lock = Padlock::named("accounts");
/// let balance = lock.wrap(10);
/// let fees = lock.wrap(1);
///
/// let _acquisition = lock.acquire();
/// balance.set(balance.get()? - fees.get()?)?;
/// assert_eq!(balance.get()?, 9);
/// # Ok::<(), padlock::Error>(())
/// ```
#[derive(Clone)]
pub struct Padlock {
    shared: Arc<Shared>,
}

struct Shared {
    // We enforce the following invariants:
    // 1. if depth > 0, then raw_mutex is locked
    // 2. if owner != 0, then raw_mutex is locked and the thread whose token is owner
    //    locked it
    // The current thread holds the lock iff owner is the token of the current thread.
    // It then also holds depth levels of it.
    raw_mutex: RawMutex,
    // Mutations of this field are protected by the raw_mutex.
    owner: AtomicUsize,
    // This field is protected by the raw_mutex.
    depth: Cell<u64>,
    id: u64,
    name: Box<str>,
}

/// One acquired level of a [`Padlock`].
///
/// Created by [`Padlock::acquire`] and [`Padlock::try_acquire`]. The level is released
/// when the acquisition is dropped, which also happens when the surrounding scope is
/// left through `?` or a panic.
///
/// Acquisitions can neither be sent to nor shared with other threads. A level is always
/// released by the thread that acquired it.
///
/// # Example
///
/// ```
/// use padlock::Padlock;
///
/// let lock = Padlock::new();
/// {
///     let _acquisition = lock.acquire();
///     assert!(lock.is_held_by_current_thread());
/// }
/// assert!(!lock.is_held_by_current_thread());
/// ```
pub struct Acquisition<'a> {
    lock: &'a Padlock,
    _phantom_not_send: PhantomNotSend,
    _phantom_not_sync: PhantomNotSync,
}

// SAFETY: - The cell in Shared is only accessed by the thread that holds raw_mutex.
unsafe impl Send for Padlock {}

// SAFETY: - Dito.
unsafe impl Sync for Padlock {}

assert_impl_all!(Padlock: Send, Sync);
assert_not_impl_any!(Acquisition<'_>: Sync, Send);

impl Default for Padlock {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! maybe_acquire_fast {
    ($slf:expr, $acquisition:ident, $ret:expr) => {
        let shared = &*$slf.shared;
        if shared.owner.load(Relaxed) == current_owner() {
            // SAFETY: - We have just checked that owner is the token of the current
            //           thread.
            //         - By the invariants, the current thread is holding the mutex.
            let $acquisition = unsafe { $slf.add_level() };
            return $ret;
        }
    };
}

impl Padlock {
    /// Creates a padlock named `Padlock-<id>`.
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// assert_eq!(lock.name(), format!("Padlock-{}", lock.id()));
    /// ```
    pub fn new() -> Self {
        let id = NEXT_ID.fetch_add(1, Relaxed);
        Self::with_id(id, format!("Padlock-{id}"))
    }

    /// Creates a padlock with the given name.
    ///
    /// Names are only used for diagnostics and need not be unique.
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::Padlock;
    ///
    /// let a = Padlock::named("state");
    /// let b = Padlock::named("state");
    /// assert_eq!(a.name(), b.name());
    /// assert_ne!(a, b);
    /// ```
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_id(NEXT_ID.fetch_add(1, Relaxed), name.into())
    }

    fn with_id(id: u64, name: String) -> Self {
        Self {
            shared: Arc::new(Shared {
                raw_mutex: RawMutex::INIT,
                owner: AtomicUsize::new(0),
                depth: Cell::new(0),
                id,
                name: name.into_boxed_str(),
            }),
        }
    }

    /// Returns the process-unique id of this padlock.
    #[inline]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Returns the name of this padlock.
    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns whether any thread holds this padlock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.shared.raw_mutex.is_locked()
    }

    /// Returns whether the current thread holds this padlock.
    ///
    /// # Example
    ///
    /// ```
    /// use std::thread;
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// let _acquisition = lock.acquire();
    /// assert!(lock.is_held_by_current_thread());
    ///
    /// thread::scope(|scope| {
    ///     scope.spawn(|| assert!(!lock.is_held_by_current_thread()));
    /// });
    /// ```
    #[inline]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.shared.owner.load(Relaxed) == current_owner()
    }

    /// Returns how many levels of this padlock the current thread holds.
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// let _a = lock.acquire();
    /// let _b = lock.acquire();
    /// assert_eq!(lock.depth(), 2);
    /// ```
    #[inline]
    pub fn depth(&self) -> u64 {
        if self.is_held_by_current_thread() {
            // The current thread holds the mutex and is the only one allowed to touch
            // this field.
            self.shared.depth.get()
        } else {
            0
        }
    }

    /// Acquires this padlock.
    ///
    /// If the current thread already holds the padlock, this adds another level and
    /// returns immediately. Otherwise it blocks until no other thread holds it. There is
    /// no timeout.
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// let _outer = lock.acquire();
    /// let _inner = lock.acquire();
    /// ```
    #[inline]
    pub fn acquire(&self) -> Acquisition<'_> {
        maybe_acquire_fast!(self, acquisition, acquisition);
        self.acquire_slow()
    }

    #[cold]
    fn acquire_slow(&self) -> Acquisition<'_> {
        let raw_mutex = &self.shared.raw_mutex;
        if !raw_mutex.try_lock() {
            trace!("padlock `{}` is contended, waiting", self.name());
            raw_mutex.lock();
        }
        // SAFETY: - We've just locked the mutex.
        unsafe { self.add_level_after_lock() }
    }

    /// Attempts to acquire this padlock without blocking.
    ///
    /// Succeeds if the current thread already holds the padlock or if no thread does.
    ///
    /// # Example
    ///
    /// ```
    /// use std::thread;
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// let _acquisition = lock.acquire();
    /// assert!(lock.try_acquire().is_some());
    ///
    /// thread::scope(|scope| {
    ///     scope.spawn(|| assert!(lock.try_acquire().is_none()));
    /// });
    /// ```
    #[inline]
    pub fn try_acquire(&self) -> Option<Acquisition<'_>> {
        maybe_acquire_fast!(self, acquisition, Some(acquisition));
        self.try_acquire_slow()
    }

    #[cold]
    fn try_acquire_slow(&self) -> Option<Acquisition<'_>> {
        self.shared.raw_mutex.try_lock().then(|| {
            // SAFETY: - We've just locked the mutex.
            unsafe { self.add_level_after_lock() }
        })
    }

    /// Adds a level if the current thread already holds this padlock.
    #[inline]
    pub(crate) fn reenter(&self) -> Option<Acquisition<'_>> {
        maybe_acquire_fast!(self, acquisition, Some(acquisition));
        None
    }

    /// # Safety
    ///
    /// - The current thread must just have succeeded in locking the mutex.
    #[inline]
    unsafe fn add_level_after_lock(&self) -> Acquisition<'_> {
        let shared = &*self.shared;
        debug_assert_eq!(shared.depth.get(), 0);
        // SAFETY: - By the requirements of this function, we've just locked the mutex.
        //         - Therefore we are allowed to mutate this field and recording the
        //           current thread upholds the invariant.
        shared.owner.store(current_owner(), Relaxed);
        // SAFETY: - owner is now the token of the current thread.
        unsafe { self.add_level() }
    }

    /// # Safety
    ///
    /// - owner must be the token of the current thread.
    #[inline]
    unsafe fn add_level(&self) -> Acquisition<'_> {
        let shared = &*self.shared;
        // By the requirements of this function, the current thread holds the mutex.
        let depth = shared.depth.get();
        if depth == u64::MAX {
            depth_overflow(self.name());
        }
        shared.depth.set(depth + 1);
        Acquisition {
            lock: self,
            _phantom_not_send: Default::default(),
            _phantom_not_sync: Default::default(),
        }
    }

    /// Releases one level.
    ///
    /// # Safety
    ///
    /// - The current thread must hold a level that is not owned by a live
    ///   [`Acquisition`].
    #[inline]
    pub(crate) unsafe fn release_level(&self) {
        let shared = &*self.shared;
        // By the requirements of this function, the current thread holds the mutex.
        let depth = shared.depth.get();
        debug_assert!(depth > 0);
        shared.depth.set(depth - 1);
        if depth == 1 {
            // SAFETY: - We've just set depth to 0.
            //         - The current thread holds the mutex.
            unsafe {
                self.release_slow();
            }
        }
    }

    /// # Safety
    ///
    /// - depth must be 0.
    /// - owner must be the token of the current thread.
    #[cold]
    unsafe fn release_slow(&self) {
        let shared = &*self.shared;
        debug_assert_eq!(shared.owner.load(Relaxed), current_owner());
        debug_assert_eq!(shared.depth.get(), 0);
        shared.owner.store(0, Relaxed);
        trace!("padlock `{}` released", self.name());
        // SAFETY: - As discussed above, the current thread is holding the mutex and no
        //           levels remain.
        unsafe {
            shared.raw_mutex.unlock();
        }
    }

    #[inline]
    pub(crate) fn addr(&self) -> *const u8 {
        let addr: *const Shared = &*self.shared;
        addr.cast()
    }
}

#[cold]
fn depth_overflow(name: &str) -> ! {
    panic!("re-entrancy depth of padlock `{name}` overflowed");
}

impl Debug for Padlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Padlock")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Padlock {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        ptr::eq::<Shared>(&*self.shared, &*other.shared)
    }
}

impl Eq for Padlock {}

impl Hash for Padlock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<'a> Acquisition<'a> {
    /// Returns the padlock this acquisition belongs to.
    #[inline]
    pub fn lock(&self) -> &'a Padlock {
        self.lock
    }

    /// Releases this level explicitly.
    ///
    /// This is the same as dropping the acquisition.
    #[inline]
    pub fn release(self) {
        let slf = ManuallyDrop::new(self);
        // SAFETY: - This acquisition owns a level of a padlock held by the current
        //           thread.
        //         - Since we've wrapped self in ManuallyDrop, the level is not released a
        //           second time.
        unsafe {
            slf.lock.release_level();
        }
    }

    /// Releases this level, runs a function, and then re-acquires the level.
    ///
    /// If the current thread holds other levels of the padlock, other threads still
    /// cannot acquire it while the function runs. The level is re-acquired even if the
    /// function panics.
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// let counter = lock.wrap(1);
    /// let mut acquisition = lock.acquire();
    /// acquisition.unlocked(|| {
    ///     assert!(!lock.is_locked());
    ///     assert!(counter.get().is_err());
    /// });
    /// assert_eq!(counter.get()?, 1);
    /// # Ok::<(), padlock::Error>(())
    /// ```
    #[inline]
    pub fn unlocked<T>(&mut self, f: impl FnOnce() -> T) -> T {
        // SAFETY: - Since we have a mutable reference, nothing can use this acquisition
        //           while the level is given up.
        //         - The level is restored before this function returns by acquiring a
        //           new one and forgetting it.
        unsafe {
            self.lock.release_level();
        }
        let _reacquire = on_drop(|| {
            mem::forget(self.lock.acquire());
        });
        f()
    }
}

impl Drop for Acquisition<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: - This acquisition owns a level of a padlock held by the current
        //           thread.
        unsafe {
            self.lock.release_level();
        }
    }
}

impl Debug for Acquisition<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquisition")
            .field("lock", &self.lock.name())
            .finish_non_exhaustive()
    }
}

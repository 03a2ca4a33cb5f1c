use {
    crate::{
        Padlock,
        error::{Error, Result},
        validate::{require_non_empty, require_not_null},
    },
    debug_fn::debug_fn,
    log::debug,
    static_assertions::assert_impl_all,
    std::{
        cell::{Cell, RefCell},
        fmt::{Debug, Formatter},
        mem,
    },
};


/// A value that can only be accessed while all of its guardian padlocks are held.
///
/// Every access checks that the current thread holds each guardian and returns
/// [`Error::GuardViolation`] otherwise. The value itself performs no locking.
///
/// Several values may share a guardian, which makes updates across them atomic under a
/// single acquisition. A value with several guardians requires all of them to be held.
///
/// `GuardedValue<T>: Sync` if `T: Send`, so the contained type can use non-atomic
/// interior mutability such as [`Cell`].
///
/// # Example
///
/// ```
/// use padlock::{GuardedValue, Padlock};
///
/// let accounts = Padlock::named("accounts");
/// let audit = Padlock::named("audit");
/// let ledger = GuardedValue::new(Vec::new(), [Some(&accounts), Some(&audit)])?;
///
/// let _accounts = accounts.acquire();
/// assert!(ledger.get().is_err());
///
/// let _audit = audit.acquire();
/// ledger.with_mut(|entries| entries.push("opened"))?;
/// assert_eq!(ledger.get()?, ["opened"]);
/// # Ok::<(), padlock::Error>(())
/// ```
pub struct GuardedValue<T> {
    guardians: Box<[Padlock]>,
    value: RefCell<T>,
}

// SAFETY: - The value is only touched after checking that the current thread holds
//           every guardian, and there is at least one guardian.
//         - Only one thread at a time can hold a padlock. The guardians are pinned for
//           the duration of each access, so no other thread can reach the RefCell
//           until the access has ended.
//         - Sharing can therefore be modeled as transferring ownership every time the
//           accessing thread changes, which requires T: Send.
unsafe impl<T> Sync for GuardedValue<T> where T: Send {}

assert_impl_all!(GuardedValue<Cell<u64>>: Send, Sync);

impl Padlock {
    /// Wraps a value in a [`GuardedValue`] guarded by this padlock alone.
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// let counter = lock.wrap(5);
    /// let _acquisition = lock.acquire();
    /// assert_eq!(counter.get()?, 5);
    /// # Ok::<(), padlock::Error>(())
    /// ```
    pub fn wrap<T>(&self, value: T) -> GuardedValue<T> {
        GuardedValue {
            guardians: Box::new([self.clone()]),
            value: RefCell::new(value),
        }
    }
}

/// Keeps one extra level of every guardian for the duration of an access.
struct Pinned<'a> {
    guardians: &'a [Padlock],
    retained: usize,
}

impl Drop for Pinned<'_> {
    fn drop(&mut self) {
        for lock in &self.guardians[..self.retained] {
            // SAFETY: - Each of these levels was added by GuardedValue::pin and its
            //           acquisition was forgotten.
            unsafe {
                lock.release_level();
            }
        }
    }
}

impl<T> GuardedValue<T> {
    /// Creates a value guarded by every padlock in `locks`.
    ///
    /// `None` entries stand for absent padlocks.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `locks` is empty.
    /// - [`Error::MissingArgument`] if the first padlock is absent.
    /// - [`Error::InvalidArgument`] if any later padlock is absent.
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::{Error, GuardedValue, Padlock};
    ///
    /// let lock = Padlock::new();
    /// assert!(GuardedValue::new(0, [Some(&lock)]).is_ok());
    /// assert_eq!(
    ///     GuardedValue::new(0, [None, Some(&lock)]).unwrap_err(),
    ///     Error::MissingArgument { name: "lock" },
    /// );
    /// ```
    pub fn new<'a, I>(initial: T, locks: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<&'a Padlock>>,
    {
        let locks: Vec<_> = locks.into_iter().collect();
        require_non_empty(&locks, "locks")?;
        let mut guardians = Vec::with_capacity(locks.len());
        guardians.push(require_not_null(locks[0], "lock")?.clone());
        for (idx, lock) in locks.iter().enumerate().skip(1) {
            let Some(lock) = lock else {
                debug!("guardian list contains an absent padlock at index {idx}");
                return Err(Error::InvalidArgument {
                    name: "locks",
                    reason: format!("entry {idx} is absent"),
                });
            };
            guardians.push((*lock).clone());
        }
        Ok(Self {
            guardians: guardians.into_boxed_slice(),
            value: RefCell::new(initial),
        })
    }

    /// Returns the guardians of this value in the order they were given.
    #[inline]
    pub fn guardians(&self) -> &[Padlock] {
        &self.guardians
    }

    /// Returns whether the current thread holds every guardian.
    #[inline]
    pub fn is_accessible(&self) -> bool {
        self.guardians.iter().all(|lock| lock.is_held_by_current_thread())
    }

    fn pin(&self) -> Result<Pinned<'_>> {
        let mut pinned = Pinned {
            guardians: &self.guardians,
            retained: 0,
        };
        for lock in self.guardians.iter() {
            let Some(acquisition) = lock.reenter() else {
                debug!(
                    "guarded value accessed without holding padlock `{}`",
                    lock.name(),
                );
                return Err(Error::GuardViolation {
                    lock: lock.name().to_owned(),
                });
            };
            mem::forget(acquisition);
            pinned.retained += 1;
        }
        Ok(pinned)
    }

    /// Runs a function with a shared reference to the value.
    ///
    /// # Errors
    ///
    /// - [`Error::GuardViolation`] if a guardian is not held by the current thread.
    /// - [`Error::ReentrantAccess`] if the value is being mutated by an enclosing
    ///   [`with_mut`](Self::with_mut).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let _pinned = self.pin()?;
        let value = self
            .value
            .try_borrow()
            .map_err(|_| Error::ReentrantAccess)?;
        Ok(f(&*value))
    }

    /// Runs a function with a mutable reference to the value.
    ///
    /// # Errors
    ///
    /// - [`Error::GuardViolation`] if a guardian is not held by the current thread.
    /// - [`Error::ReentrantAccess`] if the value is already being accessed by an
    ///   enclosing [`with`](Self::with) or [`with_mut`](Self::with_mut).
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// let queue = lock.wrap(vec![1, 2]);
    /// let _acquisition = lock.acquire();
    /// let head = queue.with_mut(|queue| queue.remove(0))?;
    /// assert_eq!(head, 1);
    /// # Ok::<(), padlock::Error>(())
    /// ```
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let _pinned = self.pin()?;
        let mut value = self
            .value
            .try_borrow_mut()
            .map_err(|_| Error::ReentrantAccess)?;
        Ok(f(&mut *value))
    }

    /// Returns a copy of the value.
    ///
    /// # Errors
    ///
    /// Same as [`with`](Self::with).
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::{Error, Padlock};
    ///
    /// let lock = Padlock::named("counter");
    /// let counter = lock.wrap(0);
    /// assert_eq!(
    ///     counter.get().unwrap_err(),
    ///     Error::GuardViolation { lock: "counter".to_owned() },
    /// );
    /// let _acquisition = lock.acquire();
    /// assert_eq!(counter.get()?, 0);
    /// # Ok::<(), padlock::Error>(())
    /// ```
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Replaces the value and returns the old one.
    ///
    /// # Errors
    ///
    /// Same as [`with_mut`](Self::with_mut).
    pub fn replace(&self, value: T) -> Result<T> {
        self.with_mut(|old| mem::replace(old, value))
    }

    /// Overwrites the value.
    ///
    /// The old value is dropped after the access has ended.
    ///
    /// # Errors
    ///
    /// Same as [`with_mut`](Self::with_mut).
    ///
    /// # Example
    ///
    /// ```
    /// use padlock::Padlock;
    ///
    /// let lock = Padlock::new();
    /// let counter = lock.wrap(0);
    /// let _acquisition = lock.acquire();
    /// counter.set(counter.get()? + 1)?;
    /// assert_eq!(counter.get()?, 1);
    /// # Ok::<(), padlock::Error>(())
    /// ```
    pub fn set(&self, value: T) -> Result<()> {
        self.replace(value).map(drop)
    }

    /// Returns a mutable reference to the value.
    ///
    /// No padlock is needed since the mutable borrow proves exclusive access.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Unwraps the value, consuming this object.
    #[inline]
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T> Debug for GuardedValue<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.guardians.iter().map(Padlock::name).collect();
        f.debug_struct("GuardedValue")
            .field("guardians", &names)
            .field(
                "value",
                &debug_fn(|fmt| {
                    let mut acquisitions = Vec::with_capacity(self.guardians.len());
                    for lock in self.guardians.iter() {
                        match lock.try_acquire() {
                            Some(acquisition) => acquisitions.push(acquisition),
                            None => return fmt.write_str("<locked>"),
                        }
                    }
                    match self.with(|value| Debug::fmt(value, fmt)) {
                        Ok(res) => res,
                        Err(_) => fmt.write_str("<borrowed>"),
                    }
                }),
            )
            .finish_non_exhaustive()
    }
}

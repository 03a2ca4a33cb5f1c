//! This crate provides the [`Padlock`] and [`GuardedValue`] types which couple shared
//! values to the locks that protect them.
//!
//! # Motivation
//!
//! A common pattern is to protect several fields with one lock:
//!
//! ```c
//! struct Account {
//!     mutex_t mutex;
//!     int balance;   // protected by mutex
//!     int overdraft; // protected by mutex
//! };
//! ```
//!
//! Nothing stops code from touching `balance` without taking `mutex`. The mistake only
//! shows up as an occasional data race.
//!
//! With this crate, each protected field is a [`GuardedValue`] that knows its guardian
//! [`Padlock`]s. Every access checks that the calling thread holds all of them and fails
//! with [`Error::GuardViolation`] if it does not, which turns the race into an
//! immediate and deterministic error.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use padlock::{GuardedValue, Padlock};
//!
//! struct Account {
//!     lock: Padlock,
//!     balance: GuardedValue<i64>,
//!     overdraft: GuardedValue<i64>,
//! }
//!
//! let lock = Padlock::named("account");
//! let account = Arc::new(Account {
//!     balance: lock.wrap(100),
//!     overdraft: lock.wrap(0),
//!     lock,
//! });
//!
//! // Forgetting the lock is an error, not a race.
//! assert!(account.balance.get().is_err());
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let account = account.clone();
//!         thread::spawn(move || -> padlock::Result<()> {
//!             let _acquisition = account.lock.acquire();
//!             account.balance.set(account.balance.get()? - 50)?;
//!             if account.balance.get()? < 0 {
//!                 account.overdraft.set(account.overdraft.get()? + 1)?;
//!             }
//!             Ok(())
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap()?;
//! }
//!
//! let _acquisition = account.lock.acquire();
//! assert_eq!(account.balance.get()?, -100);
//! assert_eq!(account.overdraft.get()?, 2);
//! # Ok::<(), padlock::Error>(())
//! ```
//!
//! [`Padlock`] is re-entrant: a thread that holds it can acquire it again without
//! blocking, and the lock becomes available to other threads once every
//! [`Acquisition`] has been released. Acquisitions are released when dropped, so an
//! early return or a panic never leaves a padlock locked.
//!
//! The padlocks do not detect deadlocks and make no fairness promises. Code that takes
//! several padlocks must take them in a consistent order.

pub use {
    error::{Error, Result},
    guarded::GuardedValue,
    padlock::{Acquisition, Padlock},
};

mod error;
mod guarded;
mod owner;
mod padlock;
pub mod validate;

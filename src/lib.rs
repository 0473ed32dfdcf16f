#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::module_inception)]

//! Per-entity locks with a global lock, deadlock interception, and lock
//! escalation.
//!
//! An [`EntityLocker`] hands out exclusive, reentrant locks on entities
//! identified by any hashable key, such as a row id or a file name. On top of
//! that it offers a global lock, which excludes every other holder at once.
//!
//! # Holders
//!
//! Locks are owned by a [`HolderId`] that the caller passes to every
//! operation, rather than by a guard. Use [`HolderId::current`] to lock on
//! behalf of the current thread, or [`HolderId::next`] to give a worker or
//! task an identity of its own. A holder must not be used by two threads at
//! the same time.
//!
//! # Deadlocks
//!
//! Before a holder blocks, the locker checks whether the wait could ever end.
//! Requests that would close a cycle fail with [`DeadlockPrevented`], which
//! names the holder that was turned away and the holder it would have waited
//! on. Nothing is acquired by a failed request, so the usual response is to
//! release what you have and try again.
//!
//! ```
//! use entitylock::{EntityLocker, HolderId};
//!
//! let locker = EntityLocker::new();
//! let alice = HolderId::next();
//! let bob = HolderId::next();
//!
//! locker.lock(alice, &"left").unwrap();
//! locker.lock(bob, &"right").unwrap();
//!
//! // bob can't have "left" yet, but waiting for it would be fine
//! assert!(!locker.try_lock(bob, &"left").unwrap());
//!
//! locker.unlock(alice, &"left").unwrap();
//! assert!(locker.try_lock(bob, &"left").unwrap());
//! ```
//!
//! # The global lock
//!
//! [`EntityLocker::global_lock`] waits for every entity lock that other
//! holders already have to be released. New holders are kept out in the
//! meantime, while holders that are already inside may keep going, so the
//! request is never starved and never waits on somebody it is blocking.
//!
//! # Escalation
//!
//! A holder that collects a large share of all entity locks is moved onto the
//! global lock automatically, and moved back once it releases enough of them.
//! The rule is an [`EscalationPolicy`]: [`ProportionalEscalation`] is the
//! default, and [`NoEscalation`] turns the feature off.

mod error;
mod escalation;
mod gate;
mod holder;
mod interceptor;
mod locker;
mod unwind;

pub use error::{DeadlockPrevented, Resource, UnlockError};
pub use escalation::{
	EscalationPolicy, NoEscalation, ProportionalEscalation, DEFAULT_MIN_LOCKS_BEFORE_GLOBAL,
};
pub use gate::{Gate, Wait};
pub use holder::{CurrentThread, HolderId};
pub use locker::EntityLocker;

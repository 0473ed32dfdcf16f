use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use log::error;

use crate::error::DeadlockPrevented;
use crate::escalation::EscalationPolicy;
use crate::unwind::on_unwind;
use crate::HolderId;

use super::EntityLocker;

impl<K: Eq + Hash + Clone + Debug, P: EscalationPolicy> EntityLocker<K, P> {
	/// Lock `key`, run `f`, and unlock `key` again, even if `f` panics.
	///
	/// # Errors
	///
	/// Fails without running `f` if waiting for `key` would deadlock.
	///
	/// # Examples
	///
	/// ```
	/// use entitylock::{EntityLocker, HolderId};
	///
	/// let locker = EntityLocker::new();
	/// let me = HolderId::current();
	///
	/// let held = locker.scoped_lock(me, &"account", || locker.is_locked_by(me, &"account"));
	/// assert_eq!(held, Ok(true));
	/// assert!(!locker.is_locked_by(me, &"account"));
	/// ```
	pub fn scoped_lock<R>(
		&self,
		holder: HolderId,
		key: &K,
		f: impl FnOnce() -> R,
	) -> Result<R, DeadlockPrevented> {
		self.lock(holder, key)?;
		Ok(self.run_entity_scope(holder, key, f))
	}

	/// Like [`scoped_lock`], but gives up after `timeout`, in which case
	/// `f` isn't run and `Ok(None)` is returned.
	///
	/// # Errors
	///
	/// Fails without running `f` if waiting for `key` would deadlock.
	///
	/// [`scoped_lock`]: `EntityLocker::scoped_lock`
	pub fn scoped_try_lock<R>(
		&self,
		holder: HolderId,
		key: &K,
		timeout: Duration,
		f: impl FnOnce() -> R,
	) -> Result<Option<R>, DeadlockPrevented> {
		if !self.try_lock_for(holder, key, timeout)? {
			return Ok(None);
		}

		Ok(Some(self.run_entity_scope(holder, key, f)))
	}

	/// Take the global lock, run `f`, and release the global lock again, even
	/// if `f` panics.
	///
	/// # Errors
	///
	/// Fails without running `f` if taking the global lock would deadlock.
	pub fn scoped_global_lock<R>(
		&self,
		holder: HolderId,
		f: impl FnOnce() -> R,
	) -> Result<R, DeadlockPrevented> {
		self.global_lock(holder)?;

		let release = || {
			if let Err(e) = self.global_unlock(holder) {
				error!("{holder} lost the global lock inside its scope: {e}");
			}
		};

		let r = on_unwind(f, &release);
		release();
		Ok(r)
	}

	fn run_entity_scope<R>(&self, holder: HolderId, key: &K, f: impl FnOnce() -> R) -> R {
		let release = || {
			if let Err(e) = self.unlock(holder, key) {
				error!("{holder} lost entity {key:?} inside its scope: {e}");
			}
		};

		let r = on_unwind(f, &release);
		release();
		r
	}
}

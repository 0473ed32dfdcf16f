use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use log::{debug, error, warn};

use crate::error::{DeadlockPrevented, UnlockError};
use crate::escalation::{EscalationPolicy, ProportionalEscalation};
use crate::gate::{Gate, Wait};
use crate::interceptor::DeadlockInterceptor;
use crate::unwind::on_unwind;
use crate::HolderId;

use super::{EntityLocker, LockTable};

impl<K: Eq + Hash + Clone + Debug> Default for EntityLocker<K> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: Eq + Hash + Clone + Debug> EntityLocker<K> {
	/// Create a locker that escalates holders of at least
	/// [`DEFAULT_MIN_LOCKS_BEFORE_GLOBAL`] entity locks.
	///
	/// [`DEFAULT_MIN_LOCKS_BEFORE_GLOBAL`]: `crate::DEFAULT_MIN_LOCKS_BEFORE_GLOBAL`
	#[must_use]
	pub fn new() -> Self {
		Self::with_policy(ProportionalEscalation::default())
	}

	/// Create a locker that escalates holders of at least
	/// `min_locks_before_global` entity locks, provided they also hold more
	/// than half of all entity locks.
	#[must_use]
	pub fn with_min_locks_before_global(min_locks_before_global: NonZeroUsize) -> Self {
		Self::with_policy(ProportionalEscalation::new(min_locks_before_global))
	}
}

impl<K: Eq + Hash + Clone + Debug, P: EscalationPolicy> EntityLocker<K, P> {
	/// Create a locker with a custom escalation policy.
	#[must_use]
	pub fn with_policy(policy: P) -> Self {
		Self {
			table: LockTable::new(),
			interceptor: DeadlockInterceptor::new(),
			escalation: policy,
			global_gate: Gate::new(),
			in_flight: Gate::new(),
		}
	}

	/// The escalation policy in use.
	#[must_use]
	pub const fn policy(&self) -> &P {
		&self.escalation
	}

	/// Lock `key` for `holder`, blocking until it's available.
	///
	/// # Errors
	///
	/// Fails without acquiring anything if waiting for `key` would deadlock.
	pub fn lock(&self, holder: HolderId, key: &K) -> Result<(), DeadlockPrevented> {
		self.acquire(holder, key, Wait::Forever).map(|_| ())
	}

	/// Lock `key` for `holder` if it's available right now.
	///
	/// Returns `Ok(false)` if the entity is held by somebody else, or if the
	/// global lock is held or being taken by somebody else. If the lock
	/// triggers escalation and the global lock isn't available right away,
	/// the entity lock is granted without it.
	///
	/// # Errors
	///
	/// Fails if `key` is held by a holder that is, directly or through
	/// others, waiting for `holder`.
	pub fn try_lock(&self, holder: HolderId, key: &K) -> Result<bool, DeadlockPrevented> {
		self.acquire(holder, key, Wait::Never)
	}

	/// Lock `key` for `holder`, waiting at most `timeout`.
	///
	/// Returns `Ok(false)` if the lock could not be acquired in time. An
	/// escalation triggered by this lock waits no longer than the same
	/// deadline.
	///
	/// # Errors
	///
	/// Fails without acquiring anything if waiting for `key` would deadlock.
	pub fn try_lock_for(
		&self,
		holder: HolderId,
		key: &K,
		timeout: Duration,
	) -> Result<bool, DeadlockPrevented> {
		self.acquire(holder, key, Wait::timeout(timeout))
	}

	/// Give up one hold on `key`.
	///
	/// Once the last hold is gone the entity is available to others. If the
	/// escalation policy decides `holder` no longer needs the global lock, it
	/// is released as well.
	///
	/// # Errors
	///
	/// Fails if `key` isn't locked, or is locked by another holder.
	pub fn unlock(&self, holder: HolderId, key: &K) -> Result<(), UnlockError> {
		let remaining = self
			.table
			.release(holder, key, || self.interceptor.before_entity_unlock(holder, key))
			.inspect_err(|e| error!("{holder} cannot unlock entity {key:?}: {e}"))?;

		self.in_flight.unlock_shared(holder);
		debug!("{holder} unlocked entity {key:?}, {remaining} holds left");

		if self.escalation.on_released(holder) {
			debug!("{holder} no longer needs the global lock");
			// exactly one global level belongs to the escalation
			self.escalation.cancel_escalation();
			if let Err(e) = self.global_unlock(holder) {
				warn!("{holder} could not give up its escalated global lock: {e}");
			}
		}

		Ok(())
	}

	/// Whether `holder` owns `key`, either directly or through the global
	/// lock.
	#[must_use]
	pub fn is_locked_by(&self, holder: HolderId, key: &K) -> bool {
		self.table.owner(key) == Some(holder) || self.in_flight.is_exclusive_owner(holder)
	}

	/// Take the global lock for `holder`, blocking until every other holder
	/// has released its entity locks.
	///
	/// The global lock is reentrant, and `holder` keeps the entity locks it
	/// already has.
	///
	/// # Errors
	///
	/// Fails without acquiring anything if another holder is waiting for an
	/// entity `holder` owns, or if `holder` owns entities and somebody else
	/// is already taking the global lock.
	pub fn global_lock(&self, holder: HolderId) -> Result<(), DeadlockPrevented> {
		self.acquire_global(holder, Wait::Forever).map(|_| ())
	}

	/// Take the global lock for `holder` if nobody else holds an entity lock
	/// right now.
	///
	/// # Errors
	///
	/// Fails under the same conditions as [`global_lock`].
	///
	/// [`global_lock`]: `EntityLocker::global_lock`
	pub fn try_global_lock(&self, holder: HolderId) -> Result<bool, DeadlockPrevented> {
		self.acquire_global(holder, Wait::Never)
	}

	/// Take the global lock for `holder`, waiting at most `timeout` in total.
	///
	/// # Errors
	///
	/// Fails under the same conditions as [`global_lock`].
	///
	/// [`global_lock`]: `EntityLocker::global_lock`
	pub fn try_global_lock_for(
		&self,
		holder: HolderId,
		timeout: Duration,
	) -> Result<bool, DeadlockPrevented> {
		self.acquire_global(holder, Wait::timeout(timeout))
	}

	/// Give up one level of the global lock.
	///
	/// # Errors
	///
	/// Fails if nobody holds the global lock, or somebody else does.
	pub fn global_unlock(&self, holder: HolderId) -> Result<(), UnlockError> {
		match self.in_flight.exclusive_owner() {
			Some(owner) if owner == holder => {}
			Some(owner) => {
				error!("{holder} cannot unlock the global lock held by {owner}");
				return Err(UnlockError::NotOwner { owner });
			}
			None => {
				error!("{holder} cannot unlock the global lock, nobody holds it");
				return Err(UnlockError::NotLocked);
			}
		}

		if self.in_flight.exclusive_depth(holder) == 1 {
			self.interceptor.after_global_unlock(holder);
			if self.escalation.escalated() == Some(holder) {
				self.escalation.cancel_escalation();
			}
		}

		self.in_flight.unlock_exclusive(holder);
		self.global_gate.unlock_exclusive(holder);
		debug!("{holder} unlocked the global lock");
		Ok(())
	}

	/// The number of entities that are currently locked.
	///
	/// Entities covered only by the global lock are not counted.
	#[must_use]
	pub fn current_size(&self) -> usize {
		self.table.held()
	}

	/// Whether anybody holds the global lock.
	#[must_use]
	pub fn is_global_locked(&self) -> bool {
		self.in_flight.exclusive_owner().is_some()
	}

	/// The holder of the global lock, if any.
	#[must_use]
	pub fn global_holder(&self) -> Option<HolderId> {
		self.in_flight.exclusive_owner()
	}

	/// The holder the escalation policy moved onto the global lock, if any.
	#[must_use]
	pub fn escalated_holder(&self) -> Option<HolderId> {
		self.escalation.escalated()
	}

	/// Pass the gates on the way to an entity lock. Holders that already
	/// hold entities are past the global gate and only need another permit
	/// for the in-flight gate.
	fn enter(&self, holder: HolderId, wait: Wait) -> bool {
		if self.in_flight.shared_count(holder) > 0 || self.in_flight.is_exclusive_owner(holder) {
			self.in_flight.lock_shared(holder);
			return true;
		}

		if !self.global_gate.lock_shared_with(holder, wait) {
			debug!("{holder} could not pass the global gate");
			return false;
		}

		let entered = self.in_flight.lock_shared_with(holder, wait);
		self.global_gate.unlock_shared(holder);
		entered
	}

	fn acquire(&self, holder: HolderId, key: &K, wait: Wait) -> Result<bool, DeadlockPrevented> {
		if !self.enter(holder, wait) {
			return Ok(false);
		}

		let result = on_unwind(
			|| self.acquire_record(holder, key, wait),
			|| {
				self.in_flight.unlock_shared(holder);
			},
		);

		match result {
			Ok(true) => {
				debug!("{holder} locked entity {key:?}");
				if self.escalation.on_granted(holder) {
					self.escalate(holder, wait);
				}
			}
			Ok(false) => {
				debug!("{holder} gave up on entity {key:?}");
				self.in_flight.unlock_shared(holder);
			}
			Err(_) => {
				self.in_flight.unlock_shared(holder);
			}
		}

		result
	}

	fn acquire_record(
		&self,
		holder: HolderId,
		key: &K,
		wait: Wait,
	) -> Result<bool, DeadlockPrevented> {
		let record = self.table.checkout(key);
		let result = on_unwind(
			|| {
				record.acquire(
					holder,
					wait,
					|| {
						debug!("{holder} is waiting for entity {key:?}");
						if wait == Wait::Never {
							self.interceptor.check_entity_lock(holder, key)
						} else {
							self.interceptor.before_entity_lock(holder, key)
						}
					},
					|granted| self.interceptor.after_entity_lock(holder, key, granted),
				)
			},
			|| self.table.checkin(key, &record),
		);

		self.table.checkin(key, &record);
		result
	}

	fn acquire_global(&self, holder: HolderId, wait: Wait) -> Result<bool, DeadlockPrevented> {
		if self.in_flight.is_exclusive_owner(holder) {
			self.global_gate.lock_exclusive(holder);
			self.in_flight.lock_exclusive(holder);
			debug!("{holder} locked the global lock again");
			return Ok(true);
		}

		self.interceptor.before_global_lock(holder)?;
		debug!("{holder} is taking the global lock");

		if !self.global_gate.lock_exclusive_with(holder, wait) {
			debug!("{holder} could not close the global gate");
			self.interceptor.after_global_lock(holder, false);
			return Ok(false);
		}

		// our own entity locks would keep the in-flight gate open forever
		let own = self.in_flight.release_shared(holder);
		let granted = self.in_flight.lock_exclusive_with(holder, wait);
		self.in_flight.restore_shared(holder, own);

		if granted {
			debug!("{holder} locked the global lock");
		} else {
			debug!("{holder} gave up waiting for other holders to finish");
			self.global_gate.unlock_exclusive(holder);
		}

		self.interceptor.after_global_lock(holder, granted);
		Ok(granted)
	}

	/// Move `holder` onto the global lock, waiting no longer than the entity
	/// acquisition that triggered it was willing to.
	fn escalate(&self, holder: HolderId, wait: Wait) {
		debug!(
			"{holder} holds {} entity locks and is taking the global lock",
			self.escalation.held(holder)
		);

		match self.acquire_global(holder, wait) {
			Ok(true) => {}
			Ok(false) => {
				debug!("escalation of {holder} ran out of time");
				self.escalation.cancel_escalation();
			}
			Err(e) => {
				warn!("escalation of {holder} abandoned: {e}");
				self.escalation.cancel_escalation();
			}
		}
	}
}

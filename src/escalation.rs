use std::collections::HashMap;
use std::num::NonZeroUsize;

use log::trace;
use parking_lot::Mutex;

use crate::HolderId;

/// The escalation threshold used by [`EntityLocker::new`].
///
/// [`EntityLocker::new`]: `crate::EntityLocker::new`
pub const DEFAULT_MIN_LOCKS_BEFORE_GLOBAL: NonZeroUsize = match NonZeroUsize::new(100) {
	Some(min) => min,
	None => unreachable!(),
};

/// Decides when a holder of many entity locks should be moved onto the
/// global lock instead.
///
/// The locker reports every granted entity lock and every release. When
/// [`on_granted`] returns `true` the locker takes the global lock on that
/// holder's behalf, and when [`on_released`] returns `true` it gives it back.
/// Escalation only affects throughput and fairness; a policy that never
/// escalates is still correct.
///
/// [`on_granted`]: `EscalationPolicy::on_granted`
/// [`on_released`]: `EscalationPolicy::on_released`
pub trait EscalationPolicy: Send + Sync {
	/// An entity lock was granted to `holder`. Returns `true` if `holder`
	/// should be escalated to the global lock now.
	fn on_granted(&self, holder: HolderId) -> bool;

	/// `holder` released an entity lock. Returns `true` if `holder` is
	/// escalated and no longer needs to be.
	fn on_released(&self, holder: HolderId) -> bool;

	/// Forget which holder is escalated. Called whenever the global lock is
	/// released.
	fn cancel_escalation(&self);

	/// The currently escalated holder, if any.
	fn escalated(&self) -> Option<HolderId>;

	/// How many entity locks the policy thinks `holder` has.
	fn held(&self, holder: HolderId) -> usize;
}

/// Escalates a holder once it has at least `min_locks_before_global` locks
/// and more than half of all outstanding locks.
///
/// Reentrant acquisitions of the same entity count once each. This is a
/// heuristic and makes no promise of fairness.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
/// use entitylock::{EscalationPolicy, HolderId, ProportionalEscalation};
///
/// let policy = ProportionalEscalation::new(NonZeroUsize::new(2).unwrap());
/// let holder = HolderId::next();
///
/// assert!(!policy.on_granted(holder));
/// assert!(policy.on_granted(holder));
/// assert_eq!(policy.escalated(), Some(holder));
///
/// assert!(policy.on_released(holder));
/// ```
#[derive(Debug)]
pub struct ProportionalEscalation {
	min_locks_before_global: usize,
	counts: Mutex<Counts>,
	escalated: Mutex<Option<HolderId>>,
}

#[derive(Debug, Default)]
struct Counts {
	by_holder: HashMap<HolderId, usize>,
	total: usize,
}

impl Default for ProportionalEscalation {
	fn default() -> Self {
		Self::new(DEFAULT_MIN_LOCKS_BEFORE_GLOBAL)
	}
}

impl ProportionalEscalation {
	#[must_use]
	pub fn new(min_locks_before_global: NonZeroUsize) -> Self {
		Self {
			min_locks_before_global: min_locks_before_global.get(),
			counts: Mutex::new(Counts::default()),
			escalated: Mutex::new(None),
		}
	}

	#[must_use]
	pub const fn min_locks_before_global(&self) -> usize {
		self.min_locks_before_global
	}

	fn needs_escalation(&self, held: usize, total: usize) -> bool {
		trace!("total locks/holder locks = {total}/{held}");
		held >= self.min_locks_before_global && held > total / 2
	}
}

impl EscalationPolicy for ProportionalEscalation {
	fn on_granted(&self, holder: HolderId) -> bool {
		let (held, total) = {
			let mut guard = self.counts.lock();
			let counts = &mut *guard;
			counts.total += 1;
			let held = counts.by_holder.entry(holder).or_insert(0);
			*held += 1;
			(*held, counts.total)
		};

		if !self.needs_escalation(held, total) {
			return false;
		}

		let mut escalated = self.escalated.lock();
		if escalated.is_some() {
			return false;
		}

		*escalated = Some(holder);
		true
	}

	fn on_released(&self, holder: HolderId) -> bool {
		let (held, total) = {
			let mut counts = self.counts.lock();
			let Some(held) = counts.by_holder.get_mut(&holder) else {
				return false;
			};

			*held -= 1;
			let held = *held;
			if held == 0 {
				counts.by_holder.remove(&holder);
			}

			counts.total -= 1;
			(held, counts.total)
		};

		!self.needs_escalation(held, total) && *self.escalated.lock() == Some(holder)
	}

	fn cancel_escalation(&self) {
		*self.escalated.lock() = None;
	}

	fn escalated(&self) -> Option<HolderId> {
		*self.escalated.lock()
	}

	fn held(&self, holder: HolderId) -> usize {
		self.counts.lock().by_holder.get(&holder).copied().unwrap_or(0)
	}
}

/// A policy that never escalates and keeps no counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEscalation;

impl EscalationPolicy for NoEscalation {
	fn on_granted(&self, _: HolderId) -> bool {
		false
	}

	fn on_released(&self, _: HolderId) -> bool {
		false
	}

	fn cancel_escalation(&self) {}

	fn escalated(&self) -> Option<HolderId> {
		None
	}

	fn held(&self, _: HolderId) -> usize {
		0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy(min: usize) -> ProportionalEscalation {
		ProportionalEscalation::new(NonZeroUsize::new(min).unwrap())
	}

	#[test]
	fn default_threshold_is_one_hundred() {
		assert_eq!(ProportionalEscalation::default().min_locks_before_global(), 100);
	}

	#[test]
	fn escalates_at_threshold() {
		let policy = policy(5);
		let holder = HolderId::next();

		for _ in 0..4 {
			assert!(!policy.on_granted(holder));
		}
		assert!(policy.on_granted(holder));
		assert_eq!(policy.escalated(), Some(holder));
		assert_eq!(policy.held(holder), 5);
	}

	#[test]
	fn needs_more_than_half_of_all_locks() {
		let policy = policy(2);

		assert!(!policy.needs_escalation(1, 1));
		assert!(!policy.needs_escalation(2, 4));
		assert!(policy.needs_escalation(3, 5));
		assert!(policy.needs_escalation(2, 3));
	}

	#[test]
	fn others_holding_locks_delays_escalation() {
		let policy = policy(3);
		let holder = HolderId::next();
		let other = HolderId::next();

		assert!(!policy.on_granted(other));
		assert!(!policy.on_granted(other));

		// 1 of 3, 2 of 4, then 3 of 5
		assert!(!policy.on_granted(holder));
		assert!(!policy.on_granted(holder));
		assert!(policy.on_granted(holder));
	}

	#[test]
	fn only_one_holder_is_escalated() {
		let policy = policy(1);
		let first = HolderId::next();
		let second = HolderId::next();

		assert!(policy.on_granted(first));
		policy.on_released(first);
		assert!(!policy.on_granted(second));
		assert_eq!(policy.escalated(), Some(first));

		policy.cancel_escalation();
		assert_eq!(policy.escalated(), None);
	}

	#[test]
	fn deescalates_below_threshold() {
		let policy = policy(3);
		let holder = HolderId::next();

		for _ in 0..4 {
			policy.on_granted(holder);
		}
		assert_eq!(policy.escalated(), Some(holder));

		// still 3 of 3
		assert!(!policy.on_released(holder));
		// 2 of 2
		assert!(policy.on_released(holder));
	}

	#[test]
	fn release_without_grant_is_ignored() {
		let policy = policy(3);
		assert!(!policy.on_released(HolderId::next()));
	}

	#[test]
	fn counts_are_dropped_at_zero() {
		let policy = policy(3);
		let holder = HolderId::next();

		policy.on_granted(holder);
		policy.on_released(holder);
		assert_eq!(policy.held(holder), 0);
	}

	#[test]
	fn no_escalation_never_escalates() {
		let holder = HolderId::next();
		for _ in 0..1000 {
			assert!(!NoEscalation.on_granted(holder));
		}
		assert!(!NoEscalation.on_released(holder));
	}
}

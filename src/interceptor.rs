//! Wait-for bookkeeping used to reject lock requests that would deadlock.
//!
//! Every holder waits for at most one thing at a time, so a deadlock can only
//! be a simple loop: follow the owner of the requested entity to whatever it
//! is waiting for, then to that entity's owner, and so on. If the walk comes
//! back to the requester, or reaches a holder that is taking the global lock,
//! blocking would never end.
//!
//! Allowing a holder to wait on several resources at once would break that
//! assumption and require a search over the whole wait-for graph.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use log::error;
use parking_lot::Mutex;

use crate::error::{DeadlockPrevented, Resource};
use crate::HolderId;

/// What a blocked holder is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WaitTarget<K> {
	/// The owner of this entity to release it
	Entity(K),
	/// Every other holder to leave the in-flight gate
	Everyone,
}

#[derive(Debug)]
struct WaitFor<K> {
	owners: HashMap<K, HolderId>,
	waiting: HashMap<HolderId, WaitTarget<K>>,
	held: HashMap<HolderId, HashSet<K>>,
	global: HashSet<HolderId>,
}

#[derive(Debug)]
pub(crate) struct DeadlockInterceptor<K> {
	state: Mutex<WaitFor<K>>,
}

impl<K: Eq + Hash + Clone + Debug> WaitFor<K> {
	/// Follow the chain of owners starting at `key` and report whether it
	/// leads back to `holder` or into a global lock aspirant.
	fn closes_cycle(&self, holder: HolderId, key: &K) -> bool {
		let mut visited = HashSet::new();
		let mut key = key;
		while let Some(&owner) = self.owners.get(key) {
			if owner == holder || self.global.contains(&owner) {
				return true;
			}

			// a loop that doesn't pass through us isn't ours to report
			if !visited.insert(owner) {
				return false;
			}

			match self.waiting.get(&owner) {
				Some(WaitTarget::Entity(next)) => key = next,
				_ => return false,
			}
		}

		false
	}

	fn reject_cycle(&self, holder: HolderId, key: &K) -> Result<(), DeadlockPrevented> {
		if !self.closes_cycle(holder, key) {
			return Ok(());
		}

		let blocker = self.owners.get(key).copied().unwrap_or(holder);
		error!("{holder} cannot lock entity {key:?} without deadlocking, it is pending on {blocker}");
		Err(DeadlockPrevented::new(holder, blocker, Resource::Entity))
	}
}

impl<K: Eq + Hash + Clone + Debug> DeadlockInterceptor<K> {
	pub(crate) fn new() -> Self {
		Self {
			state: Mutex::new(WaitFor {
				owners: HashMap::new(),
				waiting: HashMap::new(),
				held: HashMap::new(),
				global: HashSet::new(),
			}),
		}
	}

	/// Called before `holder` blocks on `key`, which is owned by someone else.
	///
	/// On success the holder is recorded as waiting for `key` until
	/// [`after_entity_lock`] is called.
	///
	/// [`after_entity_lock`]: `DeadlockInterceptor::after_entity_lock`
	pub(crate) fn before_entity_lock(
		&self,
		holder: HolderId,
		key: &K,
	) -> Result<(), DeadlockPrevented> {
		let mut state = self.state.lock();
		state.reject_cycle(holder, key)?;
		state.waiting.insert(holder, WaitTarget::Entity(key.clone()));
		Ok(())
	}

	/// The same check as [`before_entity_lock`], for a caller that is not
	/// going to block. Nothing is recorded.
	///
	/// [`before_entity_lock`]: `DeadlockInterceptor::before_entity_lock`
	pub(crate) fn check_entity_lock(
		&self,
		holder: HolderId,
		key: &K,
	) -> Result<(), DeadlockPrevented> {
		self.state.lock().reject_cycle(holder, key)
	}

	/// Called before `holder` starts waiting for the global lock.
	///
	/// On success the holder is marked as a global lock aspirant, and stays
	/// marked until the attempt fails or the global lock is released.
	pub(crate) fn before_global_lock(&self, holder: HolderId) -> Result<(), DeadlockPrevented> {
		let mut state = self.state.lock();

		if state.held.contains_key(&holder) {
			if let Some(&other) = state.global.iter().find(|other| **other != holder) {
				error!("{holder} cannot take the global lock while {other} is taking it");
				return Err(DeadlockPrevented::new(holder, other, Resource::Global));
			}
		}

		// anyone already waiting on one of our entities would wait forever
		for (&waiter, target) in &state.waiting {
			if let WaitTarget::Entity(key) = target {
				if state.owners.get(key) == Some(&holder) {
					error!("{waiter} is waiting on entity {key:?}, so {holder} cannot take the global lock");
					return Err(DeadlockPrevented::new(waiter, holder, Resource::Global));
				}
			}
		}

		state.global.insert(holder);
		state.waiting.insert(holder, WaitTarget::Everyone);
		Ok(())
	}

	/// Called once a global lock attempt by `holder` is over.
	pub(crate) fn after_global_lock(&self, holder: HolderId, granted: bool) {
		let mut state = self.state.lock();
		if state.waiting.get(&holder) == Some(&WaitTarget::Everyone) {
			state.waiting.remove(&holder);
		}

		if !granted {
			state.global.remove(&holder);
		}
	}

	/// Called once an entity lock attempt by `holder` is over.
	pub(crate) fn after_entity_lock(&self, holder: HolderId, key: &K, granted: bool) {
		let mut state = self.state.lock();
		state.waiting.remove(&holder);

		if granted {
			state.owners.insert(key.clone(), holder);
			state.held.entry(holder).or_default().insert(key.clone());
		}
	}

	/// Called when `holder` gives up its last hold on `key`.
	pub(crate) fn before_entity_unlock(&self, holder: HolderId, key: &K) {
		let mut state = self.state.lock();
		if let Some(keys) = state.held.get_mut(&holder) {
			keys.remove(key);
			if keys.is_empty() {
				state.held.remove(&holder);
			}
		}

		state.owners.remove(key);
	}

	/// Called when `holder` releases the global lock for good.
	pub(crate) fn after_global_unlock(&self, holder: HolderId) {
		let mut state = self.state.lock();
		state.global.remove(&holder);
		if state.waiting.get(&holder) == Some(&WaitTarget::Everyone) {
			state.waiting.remove(&holder);
		}
	}

	#[cfg(test)]
	fn waiting_for(&self, holder: HolderId) -> Option<WaitTarget<K>> {
		self.state.lock().waiting.get(&holder).cloned()
	}

	#[cfg(test)]
	fn is_aspirant(&self, holder: HolderId) -> bool {
		self.state.lock().global.contains(&holder)
	}
}

use crate::HolderId;

use super::{Exclusive, Gate, GateState, Wait};

impl GateState {
	fn can_share(&self, holder: HolderId) -> bool {
		match self.exclusive {
			Some(exclusive) => exclusive.owner == holder,
			// holders that are already inside may always go deeper, otherwise
			// a pending exclusive request would wait on itself
			None => self.shared.contains_key(&holder) || self.pending.iter().all(|p| *p == holder),
		}
	}

	fn can_lock_exclusive(&self, holder: HolderId) -> bool {
		match self.exclusive {
			Some(exclusive) => exclusive.owner == holder,
			None => self.shared.is_empty(),
		}
	}

	fn stop_pending(&mut self, holder: HolderId) {
		if let Some(index) = self.pending.iter().position(|p| *p == holder) {
			self.pending.swap_remove(index);
		}
	}
}

impl Gate {
	/// Create an open gate.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Take a shared permit, blocking while another holder owns or is
	/// waiting for the exclusive permit.
	pub fn lock_shared(&self, holder: HolderId) {
		self.lock_shared_with(holder, Wait::Forever);
	}

	/// Take a shared permit if it can be done without blocking.
	pub fn try_lock_shared(&self, holder: HolderId) -> bool {
		self.lock_shared_with(holder, Wait::Never)
	}

	/// Take a shared permit, waiting as long as `wait` allows.
	///
	/// Returns `true` if the permit was granted.
	pub fn lock_shared_with(&self, holder: HolderId, wait: Wait) -> bool {
		let mut state = self.state.lock();
		let mut gave_up = false;
		loop {
			if state.can_share(holder) {
				*state.shared.entry(holder).or_insert(0) += 1;
				return true;
			}

			if gave_up {
				return false;
			}

			gave_up = !wait.park(&self.changed, &mut state);
		}
	}

	/// Give back one shared permit.
	///
	/// Returns `false` if the holder had no shared permit.
	pub fn unlock_shared(&self, holder: HolderId) -> bool {
		let mut state = self.state.lock();
		let Some(count) = state.shared.get_mut(&holder) else {
			return false;
		};

		*count -= 1;
		if *count == 0 {
			state.shared.remove(&holder);
			self.changed.notify_all();
		}

		true
	}

	/// Give back every shared permit the holder has, returning how many there
	/// were.
	pub fn release_shared(&self, holder: HolderId) -> usize {
		let released = self.state.lock().shared.remove(&holder).unwrap_or(0);
		if released > 0 {
			self.changed.notify_all();
		}

		released
	}

	/// Hand back shared permits previously given up with [`release_shared`].
	///
	/// This never waits. It must only be used by a holder that owns the
	/// exclusive permit, or that is undoing its own failed upgrade.
	///
	/// [`release_shared`]: `Gate::release_shared`
	pub fn restore_shared(&self, holder: HolderId, count: usize) {
		if count == 0 {
			return;
		}

		*self.state.lock().shared.entry(holder).or_insert(0) += count;
	}

	/// Take the exclusive permit, blocking until every shared permit has been
	/// returned.
	pub fn lock_exclusive(&self, holder: HolderId) {
		self.lock_exclusive_with(holder, Wait::Forever);
	}

	/// Take the exclusive permit if it can be done without blocking.
	pub fn try_lock_exclusive(&self, holder: HolderId) -> bool {
		self.lock_exclusive_with(holder, Wait::Never)
	}

	/// Take the exclusive permit, waiting as long as `wait` allows.
	///
	/// While the request waits, holders without a shared permit cannot enter.
	/// Returns `true` if the permit was granted.
	pub fn lock_exclusive_with(&self, holder: HolderId, wait: Wait) -> bool {
		let mut state = self.state.lock();
		let mut pending = false;
		let mut gave_up = false;
		loop {
			if state.can_lock_exclusive(holder) {
				if pending {
					state.stop_pending(holder);
				}

				let exclusive = state.exclusive.get_or_insert(Exclusive {
					owner: holder,
					depth: 0,
				});
				exclusive.depth += 1;
				return true;
			}

			if gave_up {
				if pending {
					state.stop_pending(holder);
					self.changed.notify_all();
				}
				return false;
			}

			if !pending && wait != Wait::Never {
				state.pending.push(holder);
				pending = true;
			}

			gave_up = !wait.park(&self.changed, &mut state);
		}
	}

	/// Give back one level of the exclusive permit.
	///
	/// Returns `false` if the holder does not own it.
	pub fn unlock_exclusive(&self, holder: HolderId) -> bool {
		let mut state = self.state.lock();
		match &mut state.exclusive {
			Some(exclusive) if exclusive.owner == holder => {
				exclusive.depth -= 1;
				if exclusive.depth > 0 {
					return true;
				}
			}
			_ => return false,
		}

		state.exclusive = None;
		self.changed.notify_all();
		true
	}

	/// The number of shared permits the holder has.
	#[must_use]
	pub fn shared_count(&self, holder: HolderId) -> usize {
		self.state.lock().shared.get(&holder).copied().unwrap_or(0)
	}

	/// Who owns the exclusive permit, if anyone.
	#[must_use]
	pub fn exclusive_owner(&self) -> Option<HolderId> {
		self.state.lock().exclusive.map(|exclusive| exclusive.owner)
	}

	/// Whether the holder owns the exclusive permit.
	#[must_use]
	pub fn is_exclusive_owner(&self, holder: HolderId) -> bool {
		self.exclusive_owner() == Some(holder)
	}

	/// How many times the holder has taken the exclusive permit without
	/// giving it back. Zero if it isn't the owner.
	#[must_use]
	pub fn exclusive_depth(&self, holder: HolderId) -> usize {
		match self.state.lock().exclusive {
			Some(exclusive) if exclusive.owner == holder => exclusive.depth,
			_ => 0,
		}
	}

	#[cfg(test)]
	pub(crate) fn pending_count(&self) -> usize {
		self.state.lock().pending.len()
	}
}

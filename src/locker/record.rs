use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{DeadlockPrevented, UnlockError};
use crate::gate::Wait;
use crate::HolderId;

/// Reentrant exclusive lock state for one entity.
#[derive(Debug, Default)]
pub(crate) struct EntityRecord {
	state: Mutex<RecordState>,
	released: Condvar,
}

#[derive(Debug, Default)]
struct RecordState {
	owner: Option<HolderId>,
	holds: usize,
	// acquisitions that have found this record but haven't finished yet
	interest: usize,
}

impl RecordState {
	fn is_idle(&self) -> bool {
		self.holds == 0 && self.interest == 0
	}
}

impl EntityRecord {
	/// Acquire the record for `holder`.
	///
	/// `before_wait` is only called when the record is owned by somebody else,
	/// right before blocking on it. `resolved` is called with the outcome once
	/// a first acquisition is over, while the record is still locked, so the
	/// caller's bookkeeping never disagrees with the record.
	pub(crate) fn acquire(
		&self,
		holder: HolderId,
		wait: Wait,
		before_wait: impl FnOnce() -> Result<(), DeadlockPrevented>,
		resolved: impl FnOnce(bool),
	) -> Result<bool, DeadlockPrevented> {
		let mut state = self.state.lock();
		if state.owner == Some(holder) {
			state.holds += 1;
			return Ok(true);
		}

		if state.owner.is_some() {
			before_wait()?;

			let mut gave_up = false;
			while state.owner.is_some() && !gave_up {
				gave_up = !wait.park(&self.released, &mut state);
			}
		}

		let granted = state.owner.is_none();
		if granted {
			state.owner = Some(holder);
			state.holds = 1;
		}

		resolved(granted);
		Ok(granted)
	}
}

/// The table of entity records.
///
/// A record exists while it is held or while somebody is trying to acquire
/// it. Both the creation of records and their removal happen under the
/// table's lock, so an acquirer that found a record can rely on it staying in
/// the table until it checks back in.
#[derive(Debug)]
pub(crate) struct LockTable<K> {
	records: Mutex<HashMap<K, Arc<EntityRecord>>>,
}

impl<K: Eq + Hash + Clone> LockTable<K> {
	pub(crate) fn new() -> Self {
		Self {
			records: Mutex::new(HashMap::new()),
		}
	}

	/// Find or create the record for `key` and register interest in it.
	///
	/// Every checkout must be followed by a [`checkin`].
	///
	/// [`checkin`]: `LockTable::checkin`
	pub(crate) fn checkout(&self, key: &K) -> Arc<EntityRecord> {
		let mut records = self.records.lock();
		let record = match records.get(key) {
			Some(record) => Arc::clone(record),
			None => {
				let record = Arc::new(EntityRecord::default());
				records.insert(key.clone(), Arc::clone(&record));
				record
			}
		};

		record.state.lock().interest += 1;
		record
	}

	/// Withdraw interest registered by [`checkout`], dropping the record if
	/// nobody holds or wants it anymore.
	///
	/// [`checkout`]: `LockTable::checkout`
	pub(crate) fn checkin(&self, key: &K, record: &Arc<EntityRecord>) {
		let mut records = self.records.lock();
		let mut state = record.state.lock();
		state.interest -= 1;
		if state.is_idle() {
			drop(state);
			if records.get(key).is_some_and(|r| Arc::ptr_eq(r, record)) {
				records.remove(key);
			}
		}
	}

	/// Give up one hold on `key`.
	///
	/// `on_last` runs before the last hold is released, while the record is
	/// still owned by `holder`. Returns the number of holds left.
	pub(crate) fn release(
		&self,
		holder: HolderId,
		key: &K,
		on_last: impl FnOnce(),
	) -> Result<usize, UnlockError> {
		let mut records = self.records.lock();
		let Some(record) = records.get(key).cloned() else {
			return Err(UnlockError::NotLocked);
		};

		let mut state = record.state.lock();
		match state.owner {
			None => return Err(UnlockError::NotLocked),
			Some(owner) if owner != holder => return Err(UnlockError::NotOwner { owner }),
			Some(_) => {}
		}

		state.holds -= 1;
		if state.holds > 0 {
			return Ok(state.holds);
		}

		on_last();
		state.owner = None;
		let idle = state.is_idle();
		drop(state);

		record.released.notify_all();
		if idle {
			records.remove(key);
		}

		Ok(0)
	}

	/// The current owner of `key`.
	pub(crate) fn owner(&self, key: &K) -> Option<HolderId> {
		let record = self.records.lock().get(key).cloned()?;
		let owner = record.state.lock().owner;
		owner
	}

	/// The number of records that are currently held.
	pub(crate) fn held(&self) -> usize {
		self.records
			.lock()
			.values()
			.filter(|record| record.state.lock().holds > 0)
			.count()
	}

	/// The number of records in the table, held or not.
	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.records.lock().len()
	}
}

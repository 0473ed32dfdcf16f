use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::HolderId;

mod gate;

/// How long an acquisition is willing to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
	/// Block until granted
	Forever,
	/// Give up immediately if not available
	Never,
	/// Give up once this instant has passed
	Until(Instant),
}

impl Wait {
	/// A deadline `timeout` from now. A timeout too large to represent waits
	/// forever.
	#[must_use]
	pub fn timeout(timeout: Duration) -> Self {
		Instant::now()
			.checked_add(timeout)
			.map_or(Self::Forever, Self::Until)
	}

	/// Park on `condvar` once. Returns `false` if the wait gave up.
	pub(crate) fn park<T>(self, condvar: &Condvar, guard: &mut MutexGuard<'_, T>) -> bool {
		match self {
			Self::Forever => {
				condvar.wait(guard);
				true
			}
			Self::Never => false,
			Self::Until(deadline) => !condvar.wait_until(guard, deadline).timed_out(),
		}
	}
}

/// A drainable shared/exclusive barrier.
///
/// Any number of holders may pass the gate in shared mode at the same time,
/// but at most one holder may own it exclusively. Unlike an ordinary
/// reader-writer lock, permits belong to a [`HolderId`] rather than to a
/// guard, which gives the gate two properties the entity locker relies on:
///
/// * Once a holder asks for the exclusive permit, holders that have no shared
///   permit yet are held back, while holders that already have one may take
///   more. An exclusive request therefore waits only for the work that was
///   already in flight, and that work cannot be starved by it.
/// * The exclusive owner may take shared permits of its own, and the
///   exclusive permit is reentrant.
///
/// The exclusive permit is only granted when no shared permits remain, the
/// requester's own included. A holder that wants to upgrade has to give its
/// shared permits up with [`release_shared`] first, and can take them back
/// with [`restore_shared`] afterwards.
///
/// # Examples
///
/// ```
/// use entitylock::{Gate, HolderId};
///
/// let gate = Gate::new();
/// let reader = HolderId::next();
/// let writer = HolderId::next();
///
/// gate.lock_shared(reader);
/// assert!(!gate.try_lock_exclusive(writer));
///
/// gate.unlock_shared(reader);
/// assert!(gate.try_lock_exclusive(writer));
/// assert!(!gate.try_lock_shared(reader));
/// ```
///
/// [`release_shared`]: `Gate::release_shared`
/// [`restore_shared`]: `Gate::restore_shared`
#[derive(Debug, Default)]
pub struct Gate {
	state: Mutex<GateState>,
	changed: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
	shared: HashMap<HolderId, usize>,
	exclusive: Option<Exclusive>,
	pending: Vec<HolderId>,
}

#[derive(Debug, Clone, Copy)]
struct Exclusive {
	owner: HolderId,
	depth: usize,
}

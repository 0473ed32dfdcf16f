use crate::escalation::ProportionalEscalation;
use crate::gate::Gate;
use crate::interceptor::DeadlockInterceptor;

mod locker;
mod record;
mod scoped;

use record::LockTable;

/// Exclusive, reentrant locks on individual entities, plus a global lock that
/// covers all of them.
///
/// Entities are identified by keys of type `K`. Locks are owned by a
/// [`HolderId`], which every operation takes as its first argument. A holder
/// may lock the same key many times, and must unlock it as many times before
/// anybody else can have it. A `HolderId` stands for one thread of control
/// and must not be used by two threads at once.
///
/// The global lock excludes every other holder from acquiring entity locks.
/// Asking for it waits until all entity locks that other holders already have
/// are released, while keeping new holders out, so the request cannot be
/// starved. Holders that already have entity locks may still take more while
/// the request waits.
///
/// Before a holder blocks, the locker checks that waiting could ever end. If
/// the wait would close a cycle (each holder waiting for an entity owned by
/// the next, or for an entity owned by a holder that is taking the global
/// lock), the request fails with [`DeadlockPrevented`] and nothing is
/// acquired.
///
/// A holder that accumulates many entity locks may be moved onto the global
/// lock automatically, as decided by the [`EscalationPolicy`] `P`. The global
/// lock is released again once the policy no longer requires it.
///
/// # Examples
///
/// ```
/// use entitylock::{EntityLocker, HolderId};
///
/// let locker = EntityLocker::new();
/// let me = HolderId::current();
///
/// locker.lock(me, &"row-1").unwrap();
/// locker.lock(me, &"row-1").unwrap();
/// assert!(locker.is_locked_by(me, &"row-1"));
///
/// locker.unlock(me, &"row-1").unwrap();
/// locker.unlock(me, &"row-1").unwrap();
/// assert_eq!(locker.current_size(), 0);
/// ```
///
/// A holder that would wait for itself is turned away:
///
/// ```
/// use std::sync::{Arc, Barrier};
/// use std::thread;
///
/// use entitylock::{EntityLocker, HolderId};
///
/// let locker = Arc::new(EntityLocker::new());
/// let barrier = Arc::new(Barrier::new(2));
///
/// let c_locker = Arc::clone(&locker);
/// let c_barrier = Arc::clone(&barrier);
/// let other = thread::spawn(move || {
///     let me = HolderId::current();
///     c_locker.lock(me, &2).unwrap();
///     c_barrier.wait();
///     // blocks until the main thread gives up
///     c_locker.lock(me, &1).unwrap();
///     c_locker.unlock(me, &1).unwrap();
///     c_locker.unlock(me, &2).unwrap();
/// });
///
/// let me = HolderId::current();
/// locker.lock(me, &1).unwrap();
/// barrier.wait();
///
/// // once the other thread is blocked on entity 1, waiting for entity 2
/// // would never end
/// while let Ok(granted) = locker.try_lock(me, &2) {
///     assert!(!granted);
///     thread::yield_now();
/// }
///
/// locker.unlock(me, &1).unwrap();
/// other.join().unwrap();
/// ```
///
/// [`HolderId`]: `crate::HolderId`
/// [`DeadlockPrevented`]: `crate::DeadlockPrevented`
/// [`EscalationPolicy`]: `crate::EscalationPolicy`
#[derive(Debug)]
pub struct EntityLocker<K, P = ProportionalEscalation> {
	table: LockTable<K>,
	interceptor: DeadlockInterceptor<K>,
	escalation: P,
	// entered by holders without entity locks on their way in
	global_gate: Gate,
	// held in shared mode once for every entity lock held
	in_flight: Gate,
}

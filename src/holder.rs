use std::fmt::{self, Display};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use lock_api::GetThreadId;

// Ids handed to threads and to explicitly allocated holders come from the
// same counter, so the two kinds can never collide.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
	static CURRENT: HolderId = HolderId::next();
}

/// The identity of whoever is acquiring or holding a lock.
///
/// Every operation on an [`EntityLocker`] takes the caller's `HolderId`
/// instead of asking the operating system which thread is running. An OS
/// thread can use [`HolderId::current`]. Workers that are not threads (tasks
/// on a cooperative scheduler, for example) should allocate their own id with
/// [`HolderId::next`] and pass it along.
///
/// [`EntityLocker`]: `crate::EntityLocker`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId(NonZeroUsize);

impl HolderId {
	/// Allocate a new id, distinct from every other id in this process.
	///
	/// # Panics
	///
	/// Panics if the process has run out of ids, which takes `usize::MAX`
	/// allocations.
	///
	/// # Examples
	///
	/// ```
	/// use entitylock::HolderId;
	///
	/// assert_ne!(HolderId::next(), HolderId::next());
	/// ```
	#[must_use]
	#[mutants::skip] // the exhausted branch can't be reached in a test
	pub fn next() -> Self {
		let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
		match NonZeroUsize::new(id) {
			Some(id) => Self(id),
			None => panic!("holder ids have been exhausted"),
		}
	}

	/// The id of the calling thread.
	///
	/// The id is allocated the first time a thread asks for it and stays the
	/// same for the rest of that thread's life.
	///
	/// # Examples
	///
	/// ```
	/// use entitylock::HolderId;
	///
	/// let here = HolderId::current();
	/// let there = std::thread::spawn(HolderId::current).join().unwrap();
	///
	/// assert_eq!(here, HolderId::current());
	/// assert_ne!(here, there);
	/// ```
	#[must_use]
	pub fn current() -> Self {
		CURRENT.with(|id| *id)
	}

	/// The raw numeric value of this id.
	#[must_use]
	pub const fn get(self) -> NonZeroUsize {
		self.0
	}
}

impl Display for HolderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "holder#{}", self.0)
	}
}

/// Thread identity source for `lock_api`, backed by [`HolderId::current`].
///
/// This lets a `lock_api::ReentrantMutex` agree with an [`EntityLocker`] on
/// who the current thread is.
///
/// [`EntityLocker`]: `crate::EntityLocker`
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentThread;

// safety: the id is cached per thread and never reused by another thread,
//         since the counter only ever goes up
unsafe impl GetThreadId for CurrentThread {
	const INIT: Self = Self;

	fn nonzero_thread_id(&self) -> NonZeroUsize {
		HolderId::current().get()
	}
}

use std::fmt;

use thiserror::Error;

use crate::HolderId;

/// The kind of lock a rejected request was after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
	/// A lock on a single entity
	Entity,
	/// The global lock
	Global,
}

impl fmt::Display for Resource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Entity => "an entity lock",
			Self::Global => "the global lock",
		}
		.fmt(f)
	}
}

/// A lock request was rejected because waiting for it would have closed a
/// wait-for cycle.
///
/// Nothing was acquired by the rejected call. The caller may back off
/// (typically by releasing what it holds) and try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("{holder} cannot acquire {resource} without deadlocking, it is pending on {blocker}")]
pub struct DeadlockPrevented {
	holder: HolderId,
	blocker: HolderId,
	resource: Resource,
}

impl DeadlockPrevented {
	pub(crate) const fn new(holder: HolderId, blocker: HolderId, resource: Resource) -> Self {
		Self {
			holder,
			blocker,
			resource,
		}
	}

	/// The holder that would have deadlocked.
	#[must_use]
	pub const fn holder(&self) -> HolderId {
		self.holder
	}

	/// The holder that owns what the failing holder was waiting for.
	#[must_use]
	pub const fn blocker(&self) -> HolderId {
		self.blocker
	}

	/// Which kind of lock was being acquired.
	#[must_use]
	pub const fn resource(&self) -> Resource {
		self.resource
	}
}

/// Misuse of [`unlock`] or [`global_unlock`].
///
/// Both variants are programming errors in the caller.
///
/// [`unlock`]: `crate::EntityLocker::unlock`
/// [`global_unlock`]: `crate::EntityLocker::global_unlock`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum UnlockError {
	/// Nobody holds the lock
	#[error("the lock is not held")]
	NotLocked,

	/// Somebody other than the caller holds the lock
	#[error("the lock is held by {owner}")]
	NotOwner { owner: HolderId },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deadlock_message_names_both_holders() {
		let holder = HolderId::next();
		let blocker = HolderId::next();
		let error = DeadlockPrevented::new(holder, blocker, Resource::Entity);

		let message = error.to_string();
		assert!(message.contains(&holder.to_string()));
		assert!(message.contains(&blocker.to_string()));
		assert!(message.contains("an entity lock"));
	}

	#[test]
	fn deadlock_accessors() {
		let holder = HolderId::next();
		let blocker = HolderId::next();
		let error = DeadlockPrevented::new(holder, blocker, Resource::Global);

		assert_eq!(error.holder(), holder);
		assert_eq!(error.blocker(), blocker);
		assert_eq!(error.resource(), Resource::Global);
	}

	#[test]
	fn not_owner_names_the_owner() {
		let owner = HolderId::next();
		let error = UnlockError::NotOwner { owner };
		assert_eq!(error.to_string(), format!("the lock is held by {owner}"));
	}
}

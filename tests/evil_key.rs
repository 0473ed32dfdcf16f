use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};

use entitylock::{EntityLocker, HolderId};

#[derive(Debug, Clone, PartialEq, Eq)]
struct EvilKey {
	evil: bool,
}

#[allow(clippy::derived_hash_with_manual_eq)]
impl Hash for EvilKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		if self.evil {
			panic!("mwahahahaha");
		}

		0_u8.hash(state);
	}
}

#[test]
fn panicking_key_leaves_nothing_behind() {
	let locker = EntityLocker::new();
	let me = HolderId::next();

	let r = catch_unwind(AssertUnwindSafe(|| {
		let _ = locker.lock(me, &EvilKey { evil: true });
	}));
	assert!(r.is_err());
	assert_eq!(locker.current_size(), 0);

	// the failed attempt gave back its place in the in-flight gate
	let other = HolderId::next();
	assert!(locker.try_global_lock(other).unwrap());
	locker.global_unlock(other).unwrap();

	let good = EvilKey { evil: false };
	locker.lock(me, &good).unwrap();
	assert!(locker.is_locked_by(me, &good));
	locker.unlock(me, &good).unwrap();
}

#[test]
fn panicking_key_inside_the_global_lock() {
	let locker = EntityLocker::new();
	let me = HolderId::next();

	locker.global_lock(me).unwrap();
	let r = catch_unwind(AssertUnwindSafe(|| {
		let _ = locker.try_lock(me, &EvilKey { evil: true });
	}));
	assert!(r.is_err());

	locker.global_unlock(me).unwrap();
	assert!(!locker.is_global_locked());
	assert!(locker.try_global_lock(HolderId::next()).unwrap());
}

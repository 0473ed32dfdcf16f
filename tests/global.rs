use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use entitylock::{EntityLocker, HolderId};

type Locker = EntityLocker<i32>;

#[test]
fn others_time_out_while_the_global_lock_is_held() {
	let locker = Arc::new(Locker::new());
	let me = HolderId::current();
	locker.global_lock(me).unwrap();

	let c_locker = Arc::clone(&locker);
	let granted = thread::spawn(move || {
		let other = HolderId::current();
		c_locker.try_lock_for(other, &5, Duration::from_millis(50)).unwrap()
	})
	.join()
	.unwrap();
	assert!(!granted);

	locker.global_unlock(me).unwrap();

	let c_locker = Arc::clone(&locker);
	let granted = thread::spawn(move || {
		let other = HolderId::current();
		let granted = c_locker.try_lock_for(other, &5, Duration::from_millis(50)).unwrap();
		c_locker.unlock(other, &5).unwrap();
		granted
	})
	.join()
	.unwrap();
	assert!(granted);
}

#[test]
fn global_holder_keeps_its_entities() {
	let locker = Locker::new();
	let me = HolderId::next();
	let other = HolderId::next();

	locker.lock(me, &1).unwrap();
	locker.lock(me, &2).unwrap();
	locker.global_lock(me).unwrap();

	assert!(locker.is_locked_by(me, &3));
	assert_eq!(locker.current_size(), 2);
	assert!(!locker.try_lock(other, &3).unwrap());

	locker.global_unlock(me).unwrap();
	assert!(locker.is_locked_by(me, &1));
	assert!(locker.is_locked_by(me, &2));
	assert!(!locker.is_locked_by(me, &3));

	assert!(!locker.try_lock(other, &1).unwrap());
	assert!(locker.try_lock(other, &3).unwrap());

	locker.unlock(other, &3).unwrap();
	locker.unlock(me, &1).unwrap();
	locker.unlock(me, &2).unwrap();
	assert_eq!(locker.current_size(), 0);
}

#[test]
fn timed_global_lock_under_contention() {
	let locker = Locker::new();
	let me = HolderId::next();
	let other = HolderId::next();

	locker.lock(other, &1).unwrap();

	let started = Instant::now();
	assert!(!locker
		.try_global_lock_for(me, Duration::from_millis(50))
		.unwrap());
	assert!(started.elapsed() >= Duration::from_millis(50));
	assert!(!locker.is_global_locked());

	locker.unlock(other, &1).unwrap();
	assert!(locker
		.try_global_lock_for(me, Duration::from_secs(1))
		.unwrap());
	assert_eq!(locker.global_holder(), Some(me));
	locker.global_unlock(me).unwrap();
}

#[test]
fn global_lock_waits_for_holders_already_inside() {
	let locker = Arc::new(Locker::new());
	let inside = HolderId::next();
	let newcomer = HolderId::next();

	locker.lock(inside, &1).unwrap();

	let (tx, rx) = mpsc::channel();
	let c_locker = Arc::clone(&locker);
	let global = thread::spawn(move || {
		let me = HolderId::current();
		c_locker.global_lock(me).unwrap();
		tx.send(me).unwrap();
		c_locker.global_unlock(me).unwrap();
	});

	// wait for the global request to close the door on newcomers
	while locker.try_lock(newcomer, &99).unwrap() {
		locker.unlock(newcomer, &99).unwrap();
		thread::yield_now();
	}

	// holders that are already inside are not held back
	locker.lock(inside, &2).unwrap();
	assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

	locker.unlock(inside, &2).unwrap();
	assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

	locker.unlock(inside, &1).unwrap();
	let holder = rx.recv_timeout(Duration::from_secs(10)).unwrap();
	global.join().unwrap();

	assert_ne!(holder, inside);
	assert_eq!(locker.global_holder(), None);
	assert_eq!(locker.current_size(), 0);
}

#[test]
fn global_lock_blocks_until_released() {
	let locker = Arc::new(Locker::new());
	let me = HolderId::current();
	locker.global_lock(me).unwrap();

	let (tx, rx) = mpsc::channel();
	let c_locker = Arc::clone(&locker);
	let waiter = thread::spawn(move || {
		let other = HolderId::current();
		c_locker.global_lock(other).unwrap();
		tx.send(()).unwrap();
		c_locker.global_unlock(other).unwrap();
	});

	assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
	locker.global_unlock(me).unwrap();
	rx.recv_timeout(Duration::from_secs(10)).unwrap();
	waiter.join().unwrap();
}

#[test]
fn scoped_global_lock_runs_alone() {
	let locker = Locker::new();
	let me = HolderId::next();
	let other = HolderId::next();

	let blocked = locker
		.scoped_global_lock(me, || !locker.try_lock(other, &1).unwrap())
		.unwrap();

	assert!(blocked);
	assert!(!locker.is_global_locked());
}

#[test]
fn timed_global_lock_spends_one_budget_on_both_waits() {
	let locker = Arc::new(Locker::new());
	let first = HolderId::next();
	locker.lock(first, &1).unwrap();
	locker.global_lock(first).unwrap();

	let (ready_tx, ready_rx) = mpsc::channel();
	let (tx, rx) = mpsc::channel();
	let c_locker = Arc::clone(&locker);
	let waiter = thread::spawn(move || {
		let me = HolderId::current();
		ready_tx.send(()).unwrap();
		let started = Instant::now();
		let granted = c_locker
			.try_global_lock_for(me, Duration::from_secs(5))
			.unwrap();
		tx.send((me, granted, started.elapsed())).unwrap();
		if granted {
			c_locker.global_unlock(me).unwrap();
		}
	});

	// first the waiter queues behind our global lock, then behind entity 1
	ready_rx.recv_timeout(Duration::from_secs(10)).unwrap();
	thread::sleep(Duration::from_millis(50));
	locker.global_unlock(first).unwrap();
	thread::sleep(Duration::from_millis(50));
	assert!(rx.try_recv().is_err());
	locker.unlock(first, &1).unwrap();

	let (me, granted, elapsed) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
	assert!(granted);
	assert_ne!(me, first);
	assert!(elapsed >= Duration::from_millis(50));
	assert!(elapsed < Duration::from_secs(5));
	waiter.join().unwrap();
}

#[test]
fn timed_global_lock_gives_up_after_the_first_wait() {
	let locker = Arc::new(Locker::new());
	let first = HolderId::next();
	locker.lock(first, &1).unwrap();
	locker.global_lock(first).unwrap();

	let (tx, rx) = mpsc::channel();
	let c_locker = Arc::clone(&locker);
	let waiter = thread::spawn(move || {
		let me = HolderId::current();
		let granted = c_locker
			.try_global_lock_for(me, Duration::from_millis(150))
			.unwrap();
		tx.send(granted).unwrap();
	});

	// the global gate opens in time, but entity 1 stays locked
	thread::sleep(Duration::from_millis(50));
	locker.global_unlock(first).unwrap();

	assert!(!rx.recv_timeout(Duration::from_secs(10)).unwrap());
	waiter.join().unwrap();

	// the failed attempt left both gates open
	assert_eq!(locker.global_holder(), None);
	locker.unlock(first, &1).unwrap();
	assert!(locker.try_global_lock(first).unwrap());
	locker.global_unlock(first).unwrap();
}

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

/// Run `body`, and if it panics, run `cleanup` before the panic continues.
///
/// `cleanup` does not run when `body` returns normally.
pub(crate) fn on_unwind<R>(body: impl FnOnce() -> R, cleanup: impl FnOnce()) -> R {
	catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
		cleanup();
		resume_unwind(payload)
	})
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;
	use std::panic::{catch_unwind, AssertUnwindSafe};

	use super::*;

	#[test]
	fn cleanup_is_skipped_on_return() {
		let cleaned = Cell::new(false);
		let value = on_unwind(|| 42, || cleaned.set(true));

		assert_eq!(value, 42);
		assert!(!cleaned.get());
	}

	#[test]
	fn cleanup_runs_before_the_panic_continues() {
		let cleaned = Cell::new(false);
		let result = catch_unwind(AssertUnwindSafe(|| {
			on_unwind(|| panic!("boom"), || cleaned.set(true));
		}));

		assert!(result.is_err());
		assert!(cleaned.get());
	}
}

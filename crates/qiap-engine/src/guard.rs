//! Per-thread suppression of read interception.
//!
//! Extent and correction expressions read data from the same product they
//! are evaluated for. Those reads must bypass the rule set, otherwise a rule
//! would re-trigger itself. Suppression is a depth counter so nested
//! evaluations compose; the guard restores the previous depth on drop,
//! including early returns through `?`.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static SUPPRESSION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Whether rule interception is currently suppressed on this thread.
pub fn is_suppressed() -> bool {
    SUPPRESSION_DEPTH.with(|depth| depth.get() > 0)
}

/// While alive, reads on this thread bypass every rule set.
#[must_use = "interception resumes as soon as the guard is dropped"]
pub struct SuppressGuard {
    // Tied to the thread whose counter it incremented.
    _not_send: PhantomData<*const ()>,
}

impl SuppressGuard {
    pub fn enter() -> Self {
        SUPPRESSION_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        SUPPRESSION_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_nest() {
        assert!(!is_suppressed());
        let outer = SuppressGuard::enter();
        {
            let _inner = SuppressGuard::enter();
            assert!(is_suppressed());
        }
        assert!(is_suppressed());
        drop(outer);
        assert!(!is_suppressed());
    }

    #[test]
    fn test_restored_on_error_path() {
        fn failing() -> Result<(), String> {
            let _guard = SuppressGuard::enter();
            Err::<(), _>("boom".to_string())?;
            Ok(())
        }
        assert!(failing().is_err());
        assert!(!is_suppressed());
    }

    #[test]
    fn test_suppression_is_per_thread() {
        let _guard = SuppressGuard::enter();
        let other = std::thread::spawn(is_suppressed).join().unwrap();
        assert!(!other);
        assert!(is_suppressed());
    }
}

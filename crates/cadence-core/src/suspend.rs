//! Reference-counted suspend/resume gate
//!
//! Anything that subscribes to a host signal and needs to temporarily detach
//! from it shares this gate. Only the outermost suspend detaches and only the
//! matching outermost resume reattaches.

use crate::{CadenceError, CadenceResult};

/// Attachment change implied by a counter transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateTransition {
    /// 0 -> 1: detach from the host signal
    Detach,
    /// 1 -> 0: reattach to the host signal
    Attach,
    /// Nested suspend or resume; nothing to do
    Unchanged,
}

/// Non-negative suspend depth
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SuspendCounter {
    depth: u32,
}

impl SuspendCounter {
    pub fn new() -> Self {
        SuspendCounter { depth: 0 }
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.depth > 0
    }

    /// Increment the depth
    pub fn suspend(&mut self) -> GateTransition {
        self.depth = self.depth.saturating_add(1);
        if self.depth == 1 {
            GateTransition::Detach
        } else {
            GateTransition::Unchanged
        }
    }

    /// Decrement the depth. Resuming at depth zero is a caller bug.
    pub fn resume(&mut self) -> CadenceResult<GateTransition> {
        if self.depth == 0 {
            return Err(CadenceError::UnbalancedResume);
        }
        self.depth -= 1;
        if self.depth == 0 {
            Ok(GateTransition::Attach)
        } else {
            Ok(GateTransition::Unchanged)
        }
    }
}

/// Shared interface for components that can be detached from a host signal
pub trait Suspendable {
    fn suspend(&self);

    fn resume(&self) -> CadenceResult<()>;

    fn suspend_depth(&self) -> u32;

    fn is_suspended(&self) -> bool {
        self.suspend_depth() > 0
    }

    /// Suspend until the returned guard is dropped
    fn suspend_scope(&self) -> SuspendGuard<'_, Self>
    where
        Self: Sized,
    {
        self.suspend();
        SuspendGuard {
            target: self,
            released: false,
        }
    }
}

/// Scoped suspension; resumes exactly once on release or drop
#[must_use = "dropping the guard resumes immediately"]
pub struct SuspendGuard<'a, S: Suspendable + ?Sized> {
    target: &'a S,
    released: bool,
}

impl<'a, S: Suspendable + ?Sized> SuspendGuard<'a, S> {
    /// Resume now and surface any error
    pub fn release(mut self) -> CadenceResult<()> {
        self.released = true;
        self.target.resume()
    }
}

impl<'a, S: Suspendable + ?Sized> Drop for SuspendGuard<'a, S> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            // Paired with the suspend taken in suspend_scope
            let _ = self.target.resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Gate {
        counter: RefCell<SuspendCounter>,
        detaches: Cell<u32>,
        attaches: Cell<u32>,
    }

    impl Suspendable for Gate {
        fn suspend(&self) {
            if self.counter.borrow_mut().suspend() == GateTransition::Detach {
                self.detaches.set(self.detaches.get() + 1);
            }
        }

        fn resume(&self) -> CadenceResult<()> {
            if self.counter.borrow_mut().resume()? == GateTransition::Attach {
                self.attaches.set(self.attaches.get() + 1);
            }
            Ok(())
        }

        fn suspend_depth(&self) -> u32 {
            self.counter.borrow().depth()
        }
    }

    #[test]
    fn test_counter_transitions() {
        let mut counter = SuspendCounter::new();
        assert_eq!(counter.suspend(), GateTransition::Detach);
        assert_eq!(counter.suspend(), GateTransition::Unchanged);
        assert_eq!(counter.resume(), Ok(GateTransition::Unchanged));
        assert_eq!(counter.resume(), Ok(GateTransition::Attach));
        assert!(!counter.is_suspended());
    }

    #[test]
    fn test_resume_at_zero_is_usage_error() {
        let mut counter = SuspendCounter::new();
        let err = counter.resume().unwrap_err();
        assert_eq!(err, CadenceError::UnbalancedResume);
        assert!(err.is_usage_error());
        assert_eq!(counter.depth(), 0);
    }

    #[test]
    fn test_guard_resumes_on_drop() {
        let gate = Gate::default();
        {
            let _outer = gate.suspend_scope();
            let _inner = gate.suspend_scope();
            assert_eq!(gate.suspend_depth(), 2);
        }
        assert_eq!(gate.suspend_depth(), 0);
        assert_eq!(gate.detaches.get(), 1);
        assert_eq!(gate.attaches.get(), 1);
    }

    #[test]
    fn test_guard_release_resumes_once() {
        let gate = Gate::default();
        let guard = gate.suspend_scope();
        assert!(gate.is_suspended());
        guard.release().unwrap();
        assert!(!gate.is_suspended());
        assert_eq!(gate.attaches.get(), 1);
    }
}

//! Downstream handler interface

use std::rc::Rc;

use cadence_core::{CadenceResult, PaintRequest, SequencedEvent};

/// Receives events once the sequencer decides they may run.
///
/// Any method may re-enter the host and, through it, the sequencer.
pub trait EventHandler {
    /// Handle one event
    fn handle_event(&self, event: &SequencedEvent) -> CadenceResult<()>;

    /// Paint synchronously
    fn paint(&self, _request: &PaintRequest) -> CadenceResult<()> {
        Ok(())
    }

    /// Ask the host for a repaint at some later point
    fn invalidate(&self) {}
}

impl<H: EventHandler + ?Sized> EventHandler for &H {
    fn handle_event(&self, event: &SequencedEvent) -> CadenceResult<()> {
        (**self).handle_event(event)
    }

    fn paint(&self, request: &PaintRequest) -> CadenceResult<()> {
        (**self).paint(request)
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}

impl<H: EventHandler + ?Sized> EventHandler for Rc<H> {
    fn handle_event(&self, event: &SequencedEvent) -> CadenceResult<()> {
        (**self).handle_event(event)
    }

    fn paint(&self, request: &PaintRequest) -> CadenceResult<()> {
        (**self).paint(request)
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}

/// Handler built from a closure; paint and invalidate are no-ops
pub struct FnHandler<F>(pub F);

impl<F> FnHandler<F>
where
    F: Fn(&SequencedEvent) -> CadenceResult<()>,
{
    pub fn new(f: F) -> Self {
        FnHandler(f)
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&SequencedEvent) -> CadenceResult<()>,
{
    fn handle_event(&self, event: &SequencedEvent) -> CadenceResult<()> {
        (self.0)(event)
    }
}

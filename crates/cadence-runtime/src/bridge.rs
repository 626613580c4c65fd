//! Host bridge
//!
//! Owns the sequencer, the window's handler and optionally an idle queue, and
//! turns raw host notifications into calls on them.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use bytes::Bytes;
use cadence_core::{codes, CadenceResult, EventCode, PaintRequest, SequencedEvent};
use cadence_idle::{IdlePassReport, IdleQueue};
use cadence_sequencer::{DispatchOutcome, EventHandler, Sequencer, SequencerStats};
use tracing::{debug, trace};

use crate::RuntimeConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub events: u64,
    pub paints: u64,
    pub idle_passes: u64,
    pub idle_tasks_run: u64,
    pub failures: u64,
}

/// Entry point for one host window
pub struct HostBridge<H, P = ()> {
    sequencer: Sequencer,
    handler: H,
    idle: RefCell<Option<Arc<IdleQueue<P>>>>,
    stats: Cell<BridgeStats>,
}

impl<H, P> HostBridge<H, P>
where
    H: EventHandler,
    P: Clone + Send + 'static,
{
    pub fn new(config: &RuntimeConfig, handler: H) -> CadenceResult<Self> {
        config.validate()?;
        Ok(HostBridge {
            sequencer: Sequencer::new(config.sequencer.clone())?,
            handler,
            idle: RefCell::new(None),
            stats: Cell::new(BridgeStats::default()),
        })
    }

    /// Build a bridge whose handler keeps a weak handle back to it, so the
    /// handler can re-enter the bridge the way a host pump would.
    pub fn new_cyclic<F>(config: &RuntimeConfig, build: F) -> CadenceResult<Rc<Self>>
    where
        F: FnOnce(&Weak<Self>) -> H,
    {
        config.validate()?;
        let sequencer = Sequencer::new(config.sequencer.clone())?;
        Ok(Rc::new_cyclic(|this| HostBridge {
            sequencer,
            handler: build(this),
            idle: RefCell::new(None),
            stats: Cell::new(BridgeStats::default()),
        }))
    }

    /// Attach an idle queue, returning the one it replaces
    pub fn attach_idle(&self, queue: Arc<IdleQueue<P>>) -> Option<Arc<IdleQueue<P>>> {
        debug!(token = ?queue.token(), "idle queue attached to bridge");
        self.idle.borrow_mut().replace(queue)
    }

    fn bump(&self, f: impl FnOnce(&mut BridgeStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn record<T>(&self, result: CadenceResult<T>) -> CadenceResult<T> {
        if result.is_err() {
            self.bump(|s| s.failures += 1);
        }
        result
    }

    /// Host delivered an event. Paint codes are routed to `notify_paint`.
    pub fn notify_event(
        &self,
        code: EventCode,
        payload: impl Into<Bytes>,
    ) -> CadenceResult<DispatchOutcome> {
        if code == codes::PAINT {
            return self.notify_paint(PaintRequest::full());
        }
        self.bump(|s| s.events += 1);
        trace!(code = ?code, in_progress = self.sequencer.is_in_progress(), "host event");
        let event = SequencedEvent::new(code, payload);
        self.record(self.sequencer.dispatch(event, &self.handler))
    }

    /// Host asked for a paint
    pub fn notify_paint(&self, request: PaintRequest) -> CadenceResult<DispatchOutcome> {
        self.bump(|s| s.paints += 1);
        self.record(self.sequencer.paint_dispatch(request, &self.handler))
    }

    /// Host went idle. `None` when no idle queue is attached.
    pub fn notify_idle(&self) -> CadenceResult<Option<IdlePassReport>> {
        // Delegates may attach or inspect queues on this bridge
        let Some(queue) = self.idle.borrow().clone() else {
            return Ok(None);
        };
        self.bump(|s| s.idle_passes += 1);
        let report = self.record(queue.on_idle())?;
        self.bump(|s| s.idle_tasks_run += report.executed as u64);
        Ok(Some(report))
    }

    pub fn begin_sequential_block(&self) -> CadenceResult<()> {
        self.sequencer.begin_sequential_block()
    }

    pub fn end_sequential_block(&self) -> CadenceResult<()> {
        self.record(self.sequencer.end_sequential_block(&self.handler))
    }

    /// Run `f` with sequenced input held back until it returns
    pub fn sequential_block<R>(&self, f: impl FnOnce() -> CadenceResult<R>) -> CadenceResult<R> {
        self.record(self.sequencer.sequential_block(&self.handler, f))
    }
}

impl<H, P> HostBridge<H, P> {
    /// Discard undrained events and detach the idle queue from the host.
    /// Idempotent; also run on drop.
    pub fn teardown(&self) {
        let discarded = self.sequencer.teardown();
        let idle = self.idle.borrow_mut().take();
        if let Some(queue) = idle {
            queue.shutdown();
        }
        if discarded > 0 {
            debug!(discarded, "bridge torn down with undrained events");
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn idle(&self) -> Option<Arc<IdleQueue<P>>> {
        self.idle.borrow().clone()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats.get()
    }

    pub fn sequencer_stats(&self) -> SequencerStats {
        self.sequencer.stats()
    }
}

impl<H, P> Drop for HostBridge<H, P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

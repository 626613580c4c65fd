//! Reentrant message sequencer
//!
//! One in-progress flag and one SafeQueue. A sequenced event arriving while the
//! flag is held is deferred; the outermost call drains the queue before it
//! returns, including anything deferred during the drain itself.

use std::cell::Cell;

use cadence_core::{CadenceError, CadenceResult, PaintRequest, SequencedEvent};
use cadence_queue::{QueueStats, SafeQueue, SafeQueueConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::EventHandler;

/// Sequencer configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Deferred-event queue sizing
    pub queue: SafeQueueConfig,
}

/// What a dispatch call did with its input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a sequenced event; handed straight to the handler
    PassedThrough,
    /// Handled synchronously, and the deferred queue drained
    Handled,
    /// A dispatch is already running; queued for it to drain
    Deferred,
    /// A repaint was already requested in this window
    Coalesced,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequencerStats {
    pub dispatched: u64,
    pub passed_through: u64,
    pub deferred: u64,
    pub drained: u64,
    pub paints: u64,
    pub deferred_repaints: u64,
    pub coalesced_repaints: u64,
    pub handler_failures: u64,
    pub max_queue_depth: usize,
}

/// In-progress flag plus sequential-block nesting
#[derive(Debug, Default)]
struct SequencerState {
    in_progress: Cell<bool>,
    block_depth: Cell<u32>,
    /// The outermost open block took the flag and must drain on close
    block_owns_flag: Cell<bool>,
}

/// Held by the outermost dispatch; releases the flag when dropped
struct DispatchScope<'a> {
    state: &'a SequencerState,
}

impl<'a> DispatchScope<'a> {
    fn enter(state: &'a SequencerState) -> Self {
        state.in_progress.set(true);
        DispatchScope { state }
    }
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        // A block opened inside the handler and left open inherits the flag
        if self.state.block_depth.get() > 0 {
            self.state.block_owns_flag.set(true);
        } else {
            self.state.in_progress.set(false);
        }
    }
}

/// Releases a block-owned flag after the closing drain
struct BlockRelease<'a> {
    state: &'a SequencerState,
}

impl Drop for BlockRelease<'_> {
    fn drop(&mut self) {
        self.state.block_owns_flag.set(false);
        if self.state.block_depth.get() == 0 {
            self.state.in_progress.set(false);
        }
    }
}

/// Closes a scoped block that unwound without reaching its end
struct BlockGuard<'a> {
    sequencer: &'a Sequencer,
    armed: bool,
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sequencer.abandon_block();
        }
    }
}

/// Reentrant message sequencer
#[derive(Debug)]
pub struct Sequencer {
    queue: SafeQueue<SequencedEvent>,
    state: SequencerState,
    repaint_pending: Cell<bool>,
    torn_down: Cell<bool>,
    stats: Cell<SequencerStats>,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> CadenceResult<Self> {
        Ok(Sequencer {
            queue: SafeQueue::new(config.queue)?,
            state: SequencerState::default(),
            repaint_pending: Cell::new(false),
            torn_down: Cell::new(false),
            stats: Cell::new(SequencerStats::default()),
        })
    }

    fn bump(&self, f: impl FnOnce(&mut SequencerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn ensure_live(&self) -> CadenceResult<()> {
        if self.torn_down.get() {
            Err(CadenceError::SequencerTornDown)
        } else {
            Ok(())
        }
    }

    /// Deliver one event.
    ///
    /// Pass-through events go straight to the handler. Sequenced events are
    /// either handled now (followed by a drain) or deferred when a dispatch is
    /// already on the stack.
    pub fn dispatch<H>(&self, event: SequencedEvent, handler: &H) -> CadenceResult<DispatchOutcome>
    where
        H: EventHandler + ?Sized,
    {
        self.ensure_live()?;

        if !event.is_sequenced() {
            self.bump(|s| s.passed_through += 1);
            self.invoke(&event, handler)?;
            return Ok(DispatchOutcome::PassedThrough);
        }

        if self.state.in_progress.get() {
            self.defer(event)?;
            return Ok(DispatchOutcome::Deferred);
        }

        let _scope = DispatchScope::enter(&self.state);
        self.bump(|s| s.dispatched += 1);

        if self.queue.is_empty() {
            self.invoke(&event, handler)?;
        } else {
            // Leftovers from a failed cycle are older than this event
            debug!(
                leftover = self.queue.len(),
                "draining leftovers from an earlier cycle first"
            );
            self.defer(event)?;
        }
        self.drain(handler)?;
        Ok(DispatchOutcome::Handled)
    }

    /// Paint, or coalesce into a single deferred repaint while a dispatch runs
    pub fn paint_dispatch<H>(
        &self,
        request: PaintRequest,
        handler: &H,
    ) -> CadenceResult<DispatchOutcome>
    where
        H: EventHandler + ?Sized,
    {
        self.ensure_live()?;

        if self.state.in_progress.get() {
            if self.repaint_pending.replace(true) {
                self.bump(|s| s.coalesced_repaints += 1);
                return Ok(DispatchOutcome::Coalesced);
            }
            self.bump(|s| s.deferred_repaints += 1);
            trace!("paint during dispatch, requesting repaint");
            handler.invalidate();
            return Ok(DispatchOutcome::Deferred);
        }

        let _scope = DispatchScope::enter(&self.state);
        self.repaint_pending.set(false);
        self.bump(|s| s.paints += 1);
        if let Err(e) = handler.paint(&request) {
            self.bump(|s| s.handler_failures += 1);
            warn!(error = %e, "paint failed");
            return Err(e);
        }
        self.drain(handler)?;
        Ok(DispatchOutcome::Handled)
    }

    /// Claim the in-progress guarantee around arbitrary code.
    ///
    /// Nests; only the outermost matching end drains, and only if this block
    /// was the one that took the flag.
    pub fn begin_sequential_block(&self) -> CadenceResult<()> {
        self.ensure_live()?;
        let depth = self.state.block_depth.get() + 1;
        self.state.block_depth.set(depth);
        if depth == 1 && !self.state.in_progress.get() {
            self.state.in_progress.set(true);
            self.state.block_owns_flag.set(true);
        }
        trace!(depth, "sequential block opened");
        Ok(())
    }

    /// Close a sequential block, draining deferred events if it was outermost
    pub fn end_sequential_block<H>(&self, handler: &H) -> CadenceResult<()>
    where
        H: EventHandler + ?Sized,
    {
        let depth = self.state.block_depth.get();
        if depth == 0 {
            return Err(CadenceError::UnbalancedSequentialBlock);
        }
        self.state.block_depth.set(depth - 1);
        trace!(depth = depth - 1, "sequential block closed");

        if depth == 1 && self.state.block_owns_flag.get() {
            let _release = BlockRelease { state: &self.state };
            if !self.torn_down.get() {
                self.drain(handler)?;
            }
        }
        Ok(())
    }

    /// Run `f` inside a sequential block; the block is closed on every exit
    /// path. A panic inside `f` releases the flag without draining.
    pub fn sequential_block<H, R, F>(&self, handler: &H, f: F) -> CadenceResult<R>
    where
        H: EventHandler + ?Sized,
        F: FnOnce() -> CadenceResult<R>,
    {
        self.begin_sequential_block()?;
        let mut guard = BlockGuard {
            sequencer: self,
            armed: true,
        };
        let result = f();
        guard.armed = false;
        let ended = self.end_sequential_block(handler);
        let value = result?;
        ended?;
        Ok(value)
    }

    fn abandon_block(&self) {
        let depth = self.state.block_depth.get().saturating_sub(1);
        self.state.block_depth.set(depth);
        if depth == 0 && self.state.block_owns_flag.get() {
            self.state.block_owns_flag.set(false);
            self.state.in_progress.set(false);
        }
        warn!(
            depth,
            pending = self.queue.len(),
            "sequential block abandoned"
        );
    }

    fn defer(&self, event: SequencedEvent) -> CadenceResult<()> {
        trace!(code = ?event.code, depth = self.queue.len(), "deferring sequenced event");
        self.queue.add(event)?;
        let depth = self.queue.len();
        self.bump(|s| {
            s.deferred += 1;
            s.max_queue_depth = s.max_queue_depth.max(depth);
        });
        Ok(())
    }

    fn invoke<H>(&self, event: &SequencedEvent, handler: &H) -> CadenceResult<()>
    where
        H: EventHandler + ?Sized,
    {
        handler.handle_event(event).map_err(|e| {
            self.bump(|s| s.handler_failures += 1);
            warn!(
                code = ?event.code,
                error = %e,
                pending = self.queue.len(),
                "handler failed; deferred events stay queued"
            );
            e
        })
    }

    fn drain<H>(&self, handler: &H) -> CadenceResult<()>
    where
        H: EventHandler + ?Sized,
    {
        while !self.torn_down.get() {
            let Some(next) = self.queue.pop() else {
                break;
            };
            self.bump(|s| s.drained += 1);
            trace!(code = ?next.code, remaining = self.queue.len(), "draining deferred event");
            self.invoke(&next, handler)?;
        }
        Ok(())
    }

    /// Discard undrained events and refuse further dispatches.
    ///
    /// Idempotent. A handler already on the stack runs to completion, but the
    /// drain around it stops. Returns how many events were discarded.
    pub fn teardown(&self) -> usize {
        if self.torn_down.replace(true) {
            return 0;
        }
        let discarded = self.queue.len();
        self.queue.clear();
        self.repaint_pending.set(false);
        debug!(discarded, "sequencer torn down");
        discarded
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.in_progress.get()
    }

    /// Deferred events not yet drained
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn repaint_pending(&self) -> bool {
        self.repaint_pending.get()
    }

    pub fn block_depth(&self) -> u32 {
        self.state.block_depth.get()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    pub fn stats(&self) -> SequencerStats {
        self.stats.get()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Sequencer {
            queue: SafeQueue::default(),
            state: SequencerState::default(),
            repaint_pending: Cell::new(false),
            torn_down: Cell::new(false),
            stats: Cell::new(SequencerStats::default()),
        }
    }
}

//! Scripted reentrant handler
//!
//! Each event carries a numeric tag in its payload. When the handler sees a
//! tag that has a script, it replays the script against its own bridge before
//! returning, which is exactly what a host pump re-entered mid-dispatch does.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use bytes::Bytes;
use cadence_core::{CadenceError, CadenceResult, EventCode, PaintRequest, SequencedEvent};
use cadence_runtime::{HostBridge, RuntimeConfig};
use cadence_sequencer::EventHandler;

/// Bridge driven by a `ScriptedHandler`
pub type ScriptedBridge = HostBridge<ScriptedHandler, u32>;

/// One action replayed while a tagged event is being handled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Deliver another event through the bridge
    Send { code: EventCode, tag: u32 },
    /// Ask the bridge to paint
    Paint,
    /// Fail the current event after the preceding steps ran
    Fail,
}

/// Encode a tag as an event payload
pub fn tag_payload(tag: u32) -> Bytes {
    Bytes::copy_from_slice(&tag.to_le_bytes())
}

/// Decode a tag from an event payload
pub fn payload_tag(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = payload.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

pub struct ScriptedHandler {
    bridge: Weak<ScriptedBridge>,
    script: HashMap<u32, Vec<Step>>,
    handled: RefCell<Vec<(EventCode, u32)>>,
    paints: Cell<u32>,
    invalidations: Cell<u32>,
}

impl ScriptedHandler {
    /// Build a bridge whose handler replays `script`
    pub fn bridge(
        config: &RuntimeConfig,
        script: HashMap<u32, Vec<Step>>,
    ) -> CadenceResult<Rc<ScriptedBridge>> {
        HostBridge::new_cyclic(config, |this| ScriptedHandler {
            bridge: this.clone(),
            script,
            handled: RefCell::new(Vec::new()),
            paints: Cell::new(0),
            invalidations: Cell::new(0),
        })
    }

    /// Tags in the order the handler saw them
    pub fn handled_tags(&self) -> Vec<u32> {
        self.handled.borrow().iter().map(|(_, tag)| *tag).collect()
    }

    pub fn handled(&self) -> Vec<(EventCode, u32)> {
        self.handled.borrow().clone()
    }

    /// Forget everything handled so far
    pub fn clear_log(&self) {
        self.handled.borrow_mut().clear();
    }

    pub fn paints(&self) -> u32 {
        self.paints.get()
    }

    pub fn invalidations(&self) -> u32 {
        self.invalidations.get()
    }

    fn replay(&self, code: EventCode, tag: u32) -> CadenceResult<()> {
        let Some(steps) = self.script.get(&tag) else {
            return Ok(());
        };
        let Some(bridge) = self.bridge.upgrade() else {
            return Ok(());
        };
        for step in steps {
            match step {
                Step::Send { code, tag } => {
                    bridge.notify_event(*code, tag_payload(*tag))?;
                }
                Step::Paint => {
                    bridge.notify_paint(PaintRequest::full())?;
                }
                Step::Fail => {
                    return Err(CadenceError::EventHandler {
                        code,
                        reason: format!("scripted failure on tag {}", tag),
                    });
                }
            }
        }
        Ok(())
    }
}

impl EventHandler for ScriptedHandler {
    fn handle_event(&self, event: &SequencedEvent) -> CadenceResult<()> {
        let tag = payload_tag(&event.payload).ok_or_else(|| CadenceError::EventHandler {
            code: event.code,
            reason: "payload carries no tag".into(),
        })?;
        self.handled.borrow_mut().push((event.code, tag));
        self.replay(event.code, tag)
    }

    fn paint(&self, _request: &PaintRequest) -> CadenceResult<()> {
        self.paints.set(self.paints.get() + 1);
        Ok(())
    }

    fn invalidate(&self) {
        self.invalidations.set(self.invalidations.get() + 1);
    }
}

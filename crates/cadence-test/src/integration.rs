//! End-to-end scenarios
//!
//! Drives the sequencer and the idle queue through the fake host and checks
//! the guarantees a host relies on:
//! - Sequenced input is handled once each, in submission order
//! - The deferred queue survives re-entry while it grows
//! - Idle tasks run by priority, yield when incomplete, and never starve input
//! - Suspend, resume and pause keep the host subscription in step

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cadence_core::{CadenceResult, Priority, TaskId, TaskStatus};
use cadence_idle::{IdleQueue, IdleQueueConfig};
use parking_lot::Mutex;

use crate::FakeHost;

/// Fake host plus an idle queue whose tasks log their names when run
pub struct IdleScenario {
    pub host: Arc<FakeHost>,
    pub queue: Arc<IdleQueue<u32>>,
    log: Arc<Mutex<Vec<(String, u32)>>>,
}

impl IdleScenario {
    pub fn new(config: IdleQueueConfig) -> CadenceResult<Self> {
        let host = Arc::new(FakeHost::new());
        let queue = IdleQueue::new(host.clone(), config)?;
        Ok(IdleScenario {
            host,
            queue,
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Register a task that reports complete on its `runs`-th invocation
    pub fn task(&self, name: &str, runs: usize) -> CadenceResult<TaskId> {
        let log = self.log.clone();
        let name = name.to_string();
        let count = AtomicUsize::new(0);
        self.queue.register(move |param: &u32| {
            log.lock().push((name.clone(), *param));
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TaskStatus::from(n >= runs))
        })
    }

    pub fn add(&self, priority: Priority, task: TaskId, param: u32) -> CadenceResult<()> {
        self.queue.add(priority, task, param, false)
    }

    /// Names of executed tasks, in run order
    pub fn ran(&self) -> Vec<String> {
        self.log.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Parameters seen by executed tasks, in run order
    pub fn params(&self) -> Vec<u32> {
        self.log.lock().iter().map(|(_, p)| *p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    use cadence_core::{codes, CadenceError, PaintRequest, SequencedEvent, Suspendable};
    use cadence_idle::StopReason;
    use cadence_queue::{SafeQueue, SafeQueueConfig};
    use cadence_runtime::RuntimeConfig;
    use cadence_sequencer::{DispatchOutcome, EventHandler, Sequencer};

    use crate::{tag_payload, HostCall, ReentrancySimulator, ScriptedHandler, SimulatorConfig, Step};

    // ========================================================================
    // SEQUENCER
    // ========================================================================

    #[test]
    fn test_ordering_under_reentrancy() {
        let mut script = HashMap::new();
        script.insert(
            1,
            vec![
                Step::Send { code: codes::CHAR, tag: 2 },
                Step::Send { code: codes::KEY_DOWN, tag: 3 },
            ],
        );
        script.insert(2, vec![Step::Send { code: codes::CHAR, tag: 4 }]);
        script.insert(3, vec![Step::Send { code: codes::IME_CHAR, tag: 5 }]);
        let bridge = ScriptedHandler::bridge(&RuntimeConfig::default(), script).unwrap();

        bridge.notify_event(codes::CHAR, tag_payload(1)).unwrap();
        assert_eq!(bridge.handler().handled_tags(), vec![1, 2, 3, 4, 5]);
        assert!(!bridge.sequencer().is_in_progress());
    }

    #[test]
    fn test_ordering_across_seeds() {
        for seed in 0..16 {
            let mut simulator =
                ReentrancySimulator::new(SimulatorConfig::default().with_seed(seed));
            let result = simulator.run().unwrap();
            assert!(result.is_valid(), "seed {}: {:?}", seed, result);
        }
    }

    #[test]
    fn test_paint_coalescing() {
        let mut script = HashMap::new();
        script.insert(1, vec![Step::Paint, Step::Paint, Step::Paint]);
        let bridge = ScriptedHandler::bridge(&RuntimeConfig::default(), script).unwrap();

        bridge.notify_event(codes::KEY_DOWN, tag_payload(1)).unwrap();
        assert_eq!(bridge.handler().invalidations(), 1);
        assert_eq!(bridge.handler().paints(), 0);
        assert_eq!(bridge.sequencer_stats().coalesced_repaints, 2);

        // The single deferred repaint arrives later and clears the request
        bridge.notify_paint(PaintRequest::full()).unwrap();
        assert_eq!(bridge.handler().paints(), 1);
        assert!(!bridge.sequencer().repaint_pending());
    }

    /// Adds more events from inside the SafeQueue growth hook
    #[test]
    fn test_safe_queue_durability_under_growth_reentry() {
        let config = SafeQueueConfig {
            initial_capacity: 8,
            safety_margin: 4,
            max_capacity: 1 << 12,
        };
        let mut queue = SafeQueue::new(config).unwrap();
        let next = Rc::new(Cell::new(1000u32));
        let counter = next.clone();
        queue.set_grow_hook(move |q: &SafeQueue<u32>| {
            // Host pumps two messages mid-allocation
            for _ in 0..2 {
                let v = counter.get();
                counter.set(v + 1);
                q.add(v).unwrap();
            }
        });

        let mut expected = Vec::new();
        for i in 0..40u32 {
            queue.add(i).unwrap();
            expected.push(i);
            // Hook-added items land right after the add that triggered growth
            while expected.len() < queue.len() {
                expected.push(next.get() - (queue.len() - expected.len()) as u32);
            }
        }
        assert!(queue.stats().growths > 0);

        let drained: Vec<u32> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, expected);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_block_on_bridge_holds_input() {
        let bridge = ScriptedHandler::bridge(&RuntimeConfig::default(), HashMap::new()).unwrap();

        bridge.begin_sequential_block().unwrap();
        for tag in 1..=3 {
            let outcome = bridge.notify_event(codes::CHAR, tag_payload(tag)).unwrap();
            assert_eq!(outcome, DispatchOutcome::Deferred);
        }
        bridge
            .notify_event(codes::MOUSE_MOVE, tag_payload(99))
            .unwrap();
        assert_eq!(bridge.handler().handled_tags(), vec![99]);

        bridge.end_sequential_block().unwrap();
        assert_eq!(bridge.handler().handled_tags(), vec![99, 1, 2, 3]);
        assert_eq!(
            bridge.end_sequential_block().unwrap_err(),
            CadenceError::UnbalancedSequentialBlock
        );
    }

    /// A failing handler leaves later events queued for the next cycle
    #[test]
    fn test_failure_keeps_fifo_across_cycles() {
        struct Flaky {
            seen: RefCell<Vec<u8>>,
            fail_once: Cell<bool>,
            sequencer: Rc<Sequencer>,
        }

        impl EventHandler for Flaky {
            fn handle_event(&self, event: &SequencedEvent) -> CadenceResult<()> {
                let b = event.payload[0];
                self.seen.borrow_mut().push(b);
                if b == b'a' {
                    self.sequencer
                        .dispatch(SequencedEvent::new(codes::CHAR, &b"b"[..]), self)?;
                    self.sequencer
                        .dispatch(SequencedEvent::new(codes::CHAR, &b"c"[..]), self)?;
                }
                if b == b'b' && self.fail_once.replace(false) {
                    return Err(CadenceError::Handler("transient".into()));
                }
                Ok(())
            }
        }

        let sequencer = Rc::new(Sequencer::default());
        let handler = Flaky {
            seen: RefCell::new(Vec::new()),
            fail_once: Cell::new(true),
            sequencer: sequencer.clone(),
        };
        let a = SequencedEvent::new(codes::CHAR, &b"a"[..]);
        assert!(sequencer.dispatch(a, &handler).is_err());
        let d = SequencedEvent::new(codes::CHAR, &b"d"[..]);
        sequencer.dispatch(d, &handler).unwrap();
        assert_eq!(*handler.seen.borrow(), b"abcd".to_vec());
    }

    // ========================================================================
    // IDLE QUEUE
    // ========================================================================

    #[test]
    fn test_priority_ordering() {
        let s = IdleScenario::new(IdleQueueConfig::default()).unwrap();
        let f1 = s.task("f1", 1).unwrap();
        let f2 = s.task("f2", 1).unwrap();
        let f3 = s.task("f3", 1).unwrap();
        s.add(Priority::High, f1, 0).unwrap();
        s.add(Priority::Low, f2, 0).unwrap();
        s.add(Priority::Medium, f3, 0).unwrap();

        let report = s.host.fire_idle_once().unwrap().unwrap();
        assert_eq!(report.executed, 3);
        assert_eq!(s.ran(), vec!["f1", "f3", "f2"]);
    }

    #[test]
    fn test_idempotent_dedup() {
        let s = IdleScenario::new(IdleQueueConfig::default()).unwrap();
        let f = s.task("f", 1).unwrap();
        s.queue.add(Priority::Medium, f, 1, true).unwrap();
        s.queue.add(Priority::Medium, f, 2, true).unwrap();
        assert_eq!(s.queue.len(), 1);
        assert_eq!(s.queue.parameter(f), Some(2));

        s.host.fire_idle_once().unwrap().unwrap();
        assert_eq!(s.params(), vec![2]);
    }

    #[test]
    fn test_incomplete_requeue() {
        let s = IdleScenario::new(IdleQueueConfig::default()).unwrap();
        let f1 = s.task("f1", 2).unwrap();
        s.add(Priority::Medium, f1, 0).unwrap();

        s.host.fire_idle_once().unwrap().unwrap();
        assert!(s.queue.contains(f1));
        s.host.fire_idle_once().unwrap().unwrap();
        assert!(!s.queue.contains(f1));
        assert_eq!(s.ran(), vec!["f1", "f1"]);
    }

    #[test]
    fn test_suspend_resume_balance() {
        let s = IdleScenario::new(IdleQueueConfig::default()).unwrap();
        let f = s.task("f", 1).unwrap();
        s.add(Priority::Low, f, 0).unwrap();
        let token = s.queue.token();

        assert_eq!(
            s.queue.resume_idle_processing().unwrap_err(),
            CadenceError::UnbalancedResume
        );
        for _ in 0..3 {
            s.queue.suspend_idle_processing();
        }
        assert!(!s.host.is_subscribed(token));
        assert!(s.host.fire_idle().is_empty());
        for _ in 0..3 {
            s.queue.resume_idle_processing().unwrap();
        }
        assert!(s.host.is_subscribed(token));
        assert_eq!(s.queue.len(), 1);
        assert_eq!(
            s.host.calls(),
            vec![
                HostCall::Register(token),
                HostCall::Unregister(token),
                HostCall::Register(token),
            ]
        );
    }

    #[test]
    fn test_pause_is_orthogonal_to_suspend() {
        let s = IdleScenario::new(IdleQueueConfig::default()).unwrap();
        let token = s.queue.token();

        let guard = s.queue.suspend_scope();
        s.queue.set_paused(true);
        drop(guard);
        assert!(!s.host.is_subscribed(token));
        assert!(!s.queue.state().can_dispatch());

        s.queue.set_paused(false);
        assert!(s.host.is_subscribed(token));
    }

    #[test]
    fn test_input_never_starved() {
        let s = IdleScenario::new(IdleQueueConfig::default()).unwrap();
        for name in ["a", "b", "c", "d"] {
            let id = s.task(name, 1).unwrap();
            s.add(Priority::High, id, 0).unwrap();
        }

        s.host.input_pending_after(2);
        let report = s.host.fire_idle_once().unwrap().unwrap();
        assert_eq!(report.stop, StopReason::InputPending);
        assert_eq!(s.ran(), vec!["a", "b"]);

        s.host.set_input_pending(false);
        s.host.fire_idle_once().unwrap().unwrap();
        assert_eq!(s.ran(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_bridge_runs_idle_and_tears_down() {
        let s = IdleScenario::new(IdleQueueConfig::bounded(1)).unwrap();
        let a = s.task("a", 1).unwrap();
        let b = s.task("b", 1).unwrap();
        s.add(Priority::Medium, a, 0).unwrap();
        s.add(Priority::Medium, b, 0).unwrap();

        let bridge = ScriptedHandler::bridge(&RuntimeConfig::default(), HashMap::new()).unwrap();
        bridge.attach_idle(s.queue.clone());
        let report = bridge.notify_idle().unwrap().unwrap();
        assert_eq!(report.stop, StopReason::PassLimit);
        assert_eq!(s.ran(), vec!["a"]);

        drop(bridge);
        assert_eq!(s.host.subscriber_count(), 0);
        assert!(s.queue.is_empty());
    }
}

//! Idle task scheduler
//!
//! All queue state sits behind one `parking_lot::Mutex`. The lock is never
//! held while a delegate runs or while the host is called, so delegates may
//! freely add, remove or re-add tasks on the queue that is running them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use cadence_core::{
    CadenceError, CadenceResult, GateTransition, Priority, SuspendCounter, Suspendable, TaskId,
    TaskStatus,
};
use cadence_queue::PriorityQueue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{IdleCallback, IdleHandlerId, IdleHost};

/// Unit of deferred work; reports whether it has finished
pub type IdleDelegate<P> = Arc<dyn Fn(&P) -> CadenceResult<TaskStatus> + Send + Sync>;

/// IdleQueue configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleQueueConfig {
    /// Upper bound on delegate runs per idle notification
    pub max_tasks_per_pass: Option<usize>,
}

impl IdleQueueConfig {
    pub fn bounded(max_tasks_per_pass: usize) -> Self {
        IdleQueueConfig {
            max_tasks_per_pass: Some(max_tasks_per_pass),
        }
    }

    pub fn validate(&self) -> CadenceResult<()> {
        if self.max_tasks_per_pass == Some(0) {
            return Err(CadenceError::InvalidConfig(
                "max_tasks_per_pass must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Why an idle pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing left that has not already run during this pass
    Empty,
    /// The host reported pending input
    InputPending,
    Suspended,
    Paused,
    /// `max_tasks_per_pass` reached
    PassLimit,
    ShutDown,
}

/// Summary of one idle pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdlePassReport {
    /// Delegates that returned normally
    pub executed: usize,
    /// Incomplete tasks put back at the tail of their tier
    pub requeued: usize,
    pub stop: StopReason,
}

impl IdlePassReport {
    /// A pass that ran nothing
    pub fn stopped(stop: StopReason) -> Self {
        IdlePassReport {
            executed: 0,
            requeued: 0,
            stop,
        }
    }
}

/// Snapshot of the suspend/pause gate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdleState {
    pub suspend_depth: u32,
    pub paused: bool,
    /// Currently subscribed to the host idle signal
    pub attached: bool,
    pub shut_down: bool,
}

impl IdleState {
    /// Tasks are only dequeued when active and unpaused
    pub fn can_dispatch(&self) -> bool {
        !self.shut_down && self.suspend_depth == 0 && !self.paused
    }
}

struct IdleTask<P> {
    id: TaskId,
    parameter: P,
    /// Last pass that ran this entry; a pass runs each entry at most once
    last_pass: u64,
}

struct Running {
    task: TaskId,
    /// Removed or unregistered while its delegate was on the stack
    removed: bool,
    /// Queued again by its own delegate; the new entry replaces the requeue
    readded: bool,
}

struct Inner<P> {
    delegates: HashMap<TaskId, IdleDelegate<P>>,
    next_task: u64,
    tasks: PriorityQueue<IdleTask<P>>,
    running: Vec<Running>,
    suspend: SuspendCounter,
    paused: bool,
    attached: bool,
    shut_down: bool,
    pass: u64,
}

impl<P> Inner<P> {
    fn state(&self) -> IdleState {
        IdleState {
            suspend_depth: self.suspend.depth(),
            paused: self.paused,
            attached: self.attached,
            shut_down: self.shut_down,
        }
    }

    fn blocked(&self) -> Option<StopReason> {
        if self.shut_down {
            Some(StopReason::ShutDown)
        } else if self.suspend.is_suspended() {
            Some(StopReason::Suspended)
        } else if self.paused {
            Some(StopReason::Paused)
        } else {
            None
        }
    }

    fn mark_removed(&mut self, task: TaskId) -> bool {
        let mut hit = false;
        for running in self.running.iter_mut().filter(|r| r.task == task) {
            running.removed = true;
            hit = true;
        }
        hit
    }

    /// Pop the innermost running record for `task` as `(removed, readded)`
    fn finish_running(&mut self, task: TaskId) -> (bool, bool) {
        match self.running.iter().rposition(|r| r.task == task) {
            Some(pos) => {
                let running = self.running.remove(pos);
                (running.removed, running.readded)
            }
            None => (true, false),
        }
    }
}

/// Clears the running record if a delegate unwinds
struct RunningGuard<'a, P> {
    inner: &'a Mutex<Inner<P>>,
    task: TaskId,
    armed: bool,
}

impl<P> Drop for RunningGuard<'_, P> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().finish_running(self.task);
        }
    }
}

/// Priority-tiered idle scheduler bound to one host
pub struct IdleQueue<P> {
    inner: Mutex<Inner<P>>,
    host: Arc<dyn IdleHost>,
    token: IdleHandlerId,
    config: IdleQueueConfig,
    this: Weak<IdleQueue<P>>,
}

impl<P> IdleQueue<P> {
    /// Detach from the host and drop every task and registration.
    ///
    /// Idempotent. A delegate already running finishes, but is not requeued.
    pub fn shutdown(&self) {
        let detach = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return;
            }
            inner.shut_down = true;
            let dropped = inner.tasks.len();
            inner.tasks.clear();
            inner.delegates.clear();
            for running in &mut inner.running {
                running.removed = true;
            }
            debug!(token = ?self.token, dropped, "idle queue shut down");
            std::mem::replace(&mut inner.attached, false)
        };
        if detach {
            self.host.unregister_idle(self.token);
        }
    }

    /// Is `task` queued?
    pub fn contains(&self, task: TaskId) -> bool {
        self.inner.lock().tasks.contains(|t| t.id == task)
    }

    /// Drop every queued entry for `task` and keep a running one from being
    /// requeued. Returns false if there was nothing to remove.
    pub fn remove(&self, task: TaskId) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.tasks.remove_where(|t| t.id == task);
        let running = inner.mark_removed(task);
        trace!(task = ?task, removed, running, "idle task removed");
        removed > 0 || running
    }

    /// Queued entries
    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    pub fn len_of(&self, priority: Priority) -> usize {
        self.inner.lock().tasks.len_of(priority)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn suspend_depth(&self) -> u32 {
        self.inner.lock().suspend.depth()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().attached
    }

    pub fn state(&self) -> IdleState {
        self.inner.lock().state()
    }

    pub fn token(&self) -> IdleHandlerId {
        self.token
    }

    pub fn config(&self) -> &IdleQueueConfig {
        &self.config
    }
}

impl<P: Clone + Send + 'static> IdleQueue<P> {
    /// Create a queue and attach it to the host idle signal
    pub fn new(host: Arc<dyn IdleHost>, config: IdleQueueConfig) -> CadenceResult<Arc<Self>> {
        config.validate()?;
        let queue = Arc::new_cyclic(|this| IdleQueue {
            inner: Mutex::new(Inner {
                delegates: HashMap::new(),
                next_task: 1,
                tasks: PriorityQueue::new(),
                running: Vec::new(),
                suspend: SuspendCounter::new(),
                paused: false,
                attached: false,
                shut_down: false,
                pass: 0,
            }),
            host,
            token: IdleHandlerId::next(),
            config,
            this: this.clone(),
        });
        queue.sync_attachment();
        Ok(queue)
    }

    /// Register a delegate and get the identity it is queued under
    pub fn register<F>(&self, delegate: F) -> CadenceResult<TaskId>
    where
        F: Fn(&P) -> CadenceResult<TaskStatus> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Err(CadenceError::IdleQueueShutDown);
        }
        let id = TaskId::new(inner.next_task);
        inner.next_task += 1;
        inner.delegates.insert(id, Arc::new(delegate));
        trace!(task = ?id, "idle task registered");
        Ok(id)
    }

    /// Forget a delegate, dropping any queued entries for it
    pub fn unregister(&self, task: TaskId) -> CadenceResult<()> {
        let mut inner = self.inner.lock();
        if inner.delegates.remove(&task).is_none() {
            return Err(CadenceError::UnknownTask(task));
        }
        inner.tasks.remove_where(|t| t.id == task);
        inner.mark_removed(task);
        trace!(task = ?task, "idle task unregistered");
        Ok(())
    }

    /// Queue `task` with `parameter`.
    ///
    /// With `update` set and an entry for `task` already queued, that entry's
    /// parameter is replaced in place and nothing is appended.
    pub fn add(
        &self,
        priority: Priority,
        task: TaskId,
        parameter: P,
        update: bool,
    ) -> CadenceResult<()> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Err(CadenceError::IdleQueueShutDown);
        }
        if !inner.delegates.contains_key(&task) {
            return Err(CadenceError::UnknownTask(task));
        }
        if update {
            if let Some(entry) = inner.tasks.find_mut(|t| t.id == task) {
                entry.parameter = parameter;
                trace!(task = ?task, "idle task parameter updated");
                return Ok(());
            }
        }
        // A task re-adding itself has already had its turn in this pass
        let pass = inner.pass;
        let last_pass = match inner.running.iter_mut().rev().find(|r| r.task == task) {
            Some(running) => {
                running.readded = true;
                pass
            }
            None => 0,
        };
        inner.tasks.enqueue(
            priority,
            IdleTask {
                id: task,
                parameter,
                last_pass,
            },
        );
        trace!(task = ?task, ?priority, queued = inner.tasks.len(), "idle task queued");
        Ok(())
    }

    /// Parameter of the first queued entry for `task`
    pub fn parameter(&self, task: TaskId) -> Option<P> {
        let inner = self.inner.lock();
        let parameter = inner
            .tasks
            .iter()
            .find_map(|(_, t)| (t.id == task).then(|| t.parameter.clone()));
        parameter
    }

    /// Detach from the host idle signal until the matching resume
    pub fn suspend_idle_processing(&self) {
        let transition = self.inner.lock().suspend.suspend();
        if transition == GateTransition::Detach {
            self.sync_attachment();
        }
    }

    /// Undo one suspend; reattaches when the last one is undone.
    ///
    /// Fails without side effects when nothing is suspended.
    pub fn resume_idle_processing(&self) -> CadenceResult<()> {
        let transition = self.inner.lock().suspend.resume()?;
        if transition == GateTransition::Attach {
            self.sync_attachment();
        }
        Ok(())
    }

    /// Pausing detaches regardless of the suspend depth; unpausing reattaches
    /// only when nothing is suspended.
    pub fn set_paused(&self, paused: bool) {
        let changed = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.paused, paused) != paused
        };
        if changed {
            debug!(token = ?self.token, paused, "idle queue pause toggled");
            self.sync_attachment();
        }
    }

    /// Run one idle pass.
    ///
    /// Each iteration checks the host for pending input, takes the head of the
    /// highest non-empty tier and runs it. An incomplete task goes to the tail
    /// of its tier and is not run again in this pass. A delegate error ends the
    /// pass and is returned; the failing task is not requeued.
    pub fn on_idle(&self) -> CadenceResult<IdlePassReport> {
        let pass = {
            let mut inner = self.inner.lock();
            if let Some(stop) = inner.blocked() {
                return Ok(IdlePassReport::stopped(stop));
            }
            inner.pass += 1;
            inner.pass
        };

        let mut report = IdlePassReport::stopped(StopReason::Empty);
        report.stop = loop {
            if let Some(limit) = self.config.max_tasks_per_pass {
                if report.executed >= limit {
                    break StopReason::PassLimit;
                }
            }
            {
                let inner = self.inner.lock();
                if let Some(stop) = inner.blocked() {
                    break stop;
                }
                if !inner.tasks.contains(|t| t.last_pass != pass) {
                    break StopReason::Empty;
                }
            }
            if self.host.is_input_pending() {
                break StopReason::InputPending;
            }

            let (priority, task, delegate) = {
                let mut inner = self.inner.lock();
                if let Some(stop) = inner.blocked() {
                    break stop;
                }
                let Some((priority, task)) = inner.tasks.take_first(|t| t.last_pass != pass)
                else {
                    break StopReason::Empty;
                };
                let Some(delegate) = inner.delegates.get(&task.id).cloned() else {
                    warn!(task = ?task.id, "queued idle task has no delegate, dropping");
                    continue;
                };
                inner.running.push(Running {
                    task: task.id,
                    removed: false,
                    readded: false,
                });
                (priority, task, delegate)
            };

            trace!(task = ?task.id, ?priority, pass, "running idle task");
            let mut guard = RunningGuard {
                inner: &self.inner,
                task: task.id,
                armed: true,
            };
            let result = delegate(&task.parameter);
            guard.armed = false;

            let mut inner = self.inner.lock();
            let (removed, readded) = inner.finish_running(task.id);
            let status = match result {
                Ok(status) => status,
                Err(err) => {
                    drop(inner);
                    warn!(task = ?task.id, ?priority, error = %err, "idle task failed");
                    return Err(CadenceError::Task {
                        task: task.id,
                        reason: err.to_string(),
                    });
                }
            };
            report.executed += 1;

            if status.is_complete() {
                continue;
            }
            if removed || inner.shut_down {
                trace!(task = ?task.id, "incomplete task was removed while running");
            } else if readded {
                trace!(task = ?task.id, "incomplete task was re-added while running");
            } else {
                inner.tasks.enqueue(
                    priority,
                    IdleTask {
                        last_pass: pass,
                        ..task
                    },
                );
                report.requeued += 1;
            }
        };

        debug!(
            pass,
            executed = report.executed,
            requeued = report.requeued,
            stop = ?report.stop,
            "idle pass finished"
        );
        Ok(report)
    }

    /// Bring the host subscription in line with the gate
    fn sync_attachment(&self) {
        let attach = {
            let mut inner = self.inner.lock();
            let wanted = inner.state().can_dispatch();
            if wanted == inner.attached {
                return;
            }
            inner.attached = wanted;
            wanted
        };
        if attach {
            debug!(token = ?self.token, "attaching to host idle signal");
            self.host.register_idle(self.token, self.callback());
        } else {
            debug!(token = ?self.token, "detaching from host idle signal");
            self.host.unregister_idle(self.token);
        }
    }

    fn callback(&self) -> IdleCallback {
        let this = self.this.clone();
        Arc::new(move || match this.upgrade() {
            Some(queue) => queue.on_idle(),
            None => Ok(IdlePassReport::stopped(StopReason::ShutDown)),
        })
    }
}

impl<P: Clone + Send + 'static> Suspendable for IdleQueue<P> {
    fn suspend(&self) {
        self.suspend_idle_processing();
    }

    fn resume(&self) -> CadenceResult<()> {
        self.resume_idle_processing()
    }

    fn suspend_depth(&self) -> u32 {
        IdleQueue::suspend_depth(self)
    }
}

impl<P> Drop for IdleQueue<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<P> fmt::Debug for IdleQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("IdleQueue")
            .field("token", &self.token)
            .field("len", &inner.tasks.len())
            .field("registered", &inner.delegates.len())
            .field("state", &inner.state())
            .finish()
    }
}

//! Fake host driver
//!
//! Stands in for the host event loop: records idle subscriptions, fires the
//! idle signal on demand and answers input-pending peeks from a script.

use cadence_core::CadenceResult;
use cadence_idle::{IdleCallback, IdleHandlerId, IdleHost, IdlePassReport};
use parking_lot::Mutex;

/// Subscription call observed by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostCall {
    Register(IdleHandlerId),
    Unregister(IdleHandlerId),
}

#[derive(Debug, Default)]
struct InputScript {
    pending: bool,
    /// Peeks left before input turns pending
    countdown: Option<usize>,
    peeks: usize,
}

/// In-memory host
#[derive(Default)]
pub struct FakeHost {
    subscribers: Mutex<Vec<(IdleHandlerId, IdleCallback)>>,
    calls: Mutex<Vec<HostCall>>,
    input: Mutex<InputScript>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the idle signal at every current subscriber, in subscription order
    pub fn fire_idle(&self) -> Vec<CadenceResult<IdlePassReport>> {
        let callbacks: Vec<IdleCallback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        callbacks.into_iter().map(|cb| cb()).collect()
    }

    /// Fire once and return the single subscriber's report
    pub fn fire_idle_once(&self) -> Option<CadenceResult<IdlePassReport>> {
        self.fire_idle().into_iter().next()
    }

    pub fn set_input_pending(&self, pending: bool) {
        let mut input = self.input.lock();
        input.pending = pending;
        input.countdown = None;
    }

    /// Input turns pending after `peeks` more negative answers
    pub fn input_pending_after(&self, peeks: usize) {
        let mut input = self.input.lock();
        input.pending = false;
        input.countdown = Some(peeks);
    }

    /// Peeks answered so far
    pub fn input_peeks(&self) -> usize {
        self.input.lock().peeks
    }

    pub fn is_subscribed(&self, token: IdleHandlerId) -> bool {
        self.subscribers.lock().iter().any(|(t, _)| *t == token)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn registrations(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, HostCall::Register(_)))
            .count()
    }

    pub fn unregistrations(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, HostCall::Unregister(_)))
            .count()
    }
}

impl IdleHost for FakeHost {
    fn register_idle(&self, token: IdleHandlerId, callback: IdleCallback) {
        self.calls.lock().push(HostCall::Register(token));
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(t, _)| *t != token);
        subscribers.push((token, callback));
    }

    fn unregister_idle(&self, token: IdleHandlerId) {
        self.calls.lock().push(HostCall::Unregister(token));
        self.subscribers.lock().retain(|(t, _)| *t != token);
    }

    fn is_input_pending(&self) -> bool {
        let mut input = self.input.lock();
        input.peeks += 1;
        match input.countdown {
            Some(0) => {
                input.pending = true;
                input.countdown = None;
            }
            Some(n) => input.countdown = Some(n - 1),
            None => {}
        }
        input.pending
    }
}

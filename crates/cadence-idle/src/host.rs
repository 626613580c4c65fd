//! Host idle capability

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cadence_core::CadenceResult;

use crate::IdlePassReport;

/// Subscription token handed to the host on attach
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdleHandlerId(u64);

impl IdleHandlerId {
    /// Process-unique token
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        IdleHandlerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for IdleHandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdleHandler({})", self.0)
    }
}

/// Callback the host invokes when it becomes idle
pub type IdleCallback = Arc<dyn Fn() -> CadenceResult<IdlePassReport> + Send + Sync>;

/// What the idle scheduler needs from the host event loop.
///
/// Implementations must not call back into the registering queue from
/// `register_idle` or `unregister_idle`.
pub trait IdleHost: Send + Sync {
    /// Subscribe `callback` to the idle signal under `token`
    fn register_idle(&self, token: IdleHandlerId, callback: IdleCallback);

    /// Drop the subscription for `token`; unknown tokens are ignored
    fn unregister_idle(&self, token: IdleHandlerId);

    /// Non-blocking peek; must not consume the pending input
    fn is_input_pending(&self) -> bool;
}

impl<H: IdleHost + ?Sized> IdleHost for Arc<H> {
    fn register_idle(&self, token: IdleHandlerId, callback: IdleCallback) {
        (**self).register_idle(token, callback)
    }

    fn unregister_idle(&self, token: IdleHandlerId) {
        (**self).unregister_idle(token)
    }

    fn is_input_pending(&self) -> bool {
        (**self).is_input_pending()
    }
}

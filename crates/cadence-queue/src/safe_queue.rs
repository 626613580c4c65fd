//! Reentrant-safe circular buffer
//!
//! `SafeQueue` holds items deferred while a dispatch is in flight. It can be
//! appended to again while it is in the middle of growing: the host may pump
//! messages as a side effect of the allocation, and those messages land back
//! here before the copy into the larger store has happened.
//!
//! The buffer therefore keeps `safety_margin` free slots in reserve. Growth
//! starts as soon as an insertion leaves fewer free slots than that, and a
//! nested growth attempt while one is already in flight is skipped. Insertions
//! made during the growth consume the reserve instead.

use std::cell::{Cell, RefCell};
use std::fmt;

use cadence_core::{CadenceError, CadenceResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// SafeQueue configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeQueueConfig {
    /// Slots allocated up front
    pub initial_capacity: usize,
    /// Minimum free slots kept in reserve for insertions during growth
    pub safety_margin: usize,
    /// Hard limit on the backing store
    pub max_capacity: usize,
}

impl Default for SafeQueueConfig {
    fn default() -> Self {
        SafeQueueConfig {
            initial_capacity: 64,
            safety_margin: 50,
            max_capacity: 1 << 20,
        }
    }
}

impl SafeQueueConfig {
    /// Small reserve, for hosts that re-enter shallowly
    pub fn tight() -> Self {
        SafeQueueConfig {
            initial_capacity: 16,
            safety_margin: 4,
            max_capacity: 1 << 16,
        }
    }

    pub fn with_margin(mut self, safety_margin: usize) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    pub fn validate(&self) -> CadenceResult<()> {
        if self.safety_margin == 0 {
            return Err(CadenceError::InvalidConfig(
                "safety_margin must be at least 1".into(),
            ));
        }
        if self.initial_capacity <= self.safety_margin + 1 {
            return Err(CadenceError::InvalidConfig(format!(
                "initial_capacity {} must exceed safety_margin + 1 ({})",
                self.initial_capacity,
                self.safety_margin + 1
            )));
        }
        if self.max_capacity < self.initial_capacity {
            return Err(CadenceError::InvalidConfig(format!(
                "max_capacity {} is below initial_capacity {}",
                self.max_capacity, self.initial_capacity
            )));
        }
        Ok(())
    }
}

/// Growth counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub growths: u32,
    pub skipped_growths: u32,
    /// Growths refused because the queue is already at `max_capacity`
    pub saturated: u32,
    pub high_water: usize,
}

/// Callback fired after a growth has allocated its new store and before the
/// live items are copied across. Anything it adds goes into the old store.
pub type GrowHook<T> = Box<dyn Fn(&SafeQueue<T>)>;

/// Circular store; one slot always stays empty so `read == write` means empty
struct Ring<T> {
    slots: Vec<Option<T>>,
    read: usize,
    write: usize,
}

fn allocate<T>(capacity: usize) -> Vec<Option<T>> {
    let mut slots = Vec::with_capacity(capacity);
    slots.resize_with(capacity, || None);
    slots
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Ring {
            slots: allocate(capacity),
            read: 0,
            write: 0,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn len(&self) -> usize {
        let cap = self.capacity();
        (self.write + cap - self.read) % cap
    }

    #[inline]
    fn free_slots(&self) -> usize {
        self.capacity() - self.len() - 1
    }

    fn push(&mut self, item: T) {
        let cap = self.capacity();
        self.slots[self.write] = Some(item);
        self.write = (self.write + 1) % cap;
    }

    fn pop(&mut self) -> Option<T> {
        if self.read == self.write {
            return None;
        }
        let cap = self.capacity();
        let item = self.slots[self.read].take();
        self.read = (self.read + 1) % cap;
        item
    }

    /// Move every live item, oldest first, into `slots` and adopt it
    fn relocate(&mut self, mut slots: Vec<Option<T>>) -> usize {
        let mut count = 0;
        while let Some(item) = self.pop() {
            slots[count] = Some(item);
            count += 1;
        }
        self.slots = slots;
        self.read = 0;
        self.write = count;
        count
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.read = 0;
        self.write = 0;
    }
}

/// Resets the growing flag on every exit path, including unwinding out of a hook
struct GrowingFlag<'a>(&'a Cell<bool>);

impl Drop for GrowingFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Reentrant-safe FIFO ring buffer
pub struct SafeQueue<T> {
    ring: RefCell<Ring<T>>,
    growing: Cell<bool>,
    stats: Cell<QueueStats>,
    config: SafeQueueConfig,
    grow_hook: Option<GrowHook<T>>,
}

impl<T> SafeQueue<T> {
    /// Create a queue with a validated configuration
    pub fn new(config: SafeQueueConfig) -> CadenceResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SafeQueueConfig) -> Self {
        SafeQueue {
            ring: RefCell::new(Ring::with_capacity(config.initial_capacity)),
            growing: Cell::new(false),
            stats: Cell::new(QueueStats::default()),
            config,
            grow_hook: None,
        }
    }

    /// Install a callback observed in the middle of every growth
    pub fn set_grow_hook(&mut self, hook: impl Fn(&SafeQueue<T>) + 'static) {
        self.grow_hook = Some(Box::new(hook));
    }

    pub fn clear_grow_hook(&mut self) {
        self.grow_hook = None;
    }

    /// Append an item at the logical end.
    ///
    /// Safe to call from inside a growth of this same queue.
    pub fn add(&self, item: T) -> CadenceResult<()> {
        let free = {
            let mut ring = self.ring.borrow_mut();
            if ring.free_slots() == 0 {
                let capacity = ring.capacity();
                return Err(if self.growing.get() {
                    CadenceError::NoFreeSlots { capacity }
                } else {
                    CadenceError::CapacityExceeded {
                        capacity: self.config.max_capacity,
                        requested: ring.len() + 1,
                    }
                });
            }
            ring.push(item);
            let len = ring.len();
            let mut stats = self.stats.get();
            stats.high_water = stats.high_water.max(len);
            self.stats.set(stats);
            ring.free_slots()
        };

        if free < self.config.safety_margin {
            self.grow();
        }
        Ok(())
    }

    /// Pop the oldest item
    pub fn remove(&self) -> CadenceResult<T> {
        self.ring
            .borrow_mut()
            .pop()
            .ok_or(CadenceError::EmptyQueue)
    }

    /// Pop the oldest item, if any
    pub fn pop(&self) -> Option<T> {
        self.ring.borrow_mut().pop()
    }

    fn grow(&self) {
        if self.growing.get() {
            let mut stats = self.stats.get();
            stats.skipped_growths += 1;
            self.stats.set(stats);
            trace!(
                free = self.free_slots(),
                "growth already in flight, absorbing insert in reserve"
            );
            return;
        }
        self.growing.set(true);
        let _flag = GrowingFlag(&self.growing);

        loop {
            let old_capacity = self.ring.borrow().capacity();
            let new_capacity =
                (old_capacity + 2 * self.config.safety_margin).min(self.config.max_capacity);
            if new_capacity <= old_capacity {
                let mut stats = self.stats.get();
                stats.saturated += 1;
                self.stats.set(stats);
                // Capacity never shrinks, so saturation is reported once
                if stats.saturated == 1 {
                    warn!(
                        capacity = old_capacity,
                        "safe queue at hard capacity, running on reserve"
                    );
                } else {
                    trace!(capacity = old_capacity, "safe queue still saturated");
                }
                return;
            }

            let slots = allocate(new_capacity);

            if let Some(hook) = &self.grow_hook {
                hook(self);
            }

            let (count, free) = {
                let mut ring = self.ring.borrow_mut();
                let count = ring.relocate(slots);
                (count, ring.free_slots())
            };

            let mut stats = self.stats.get();
            stats.growths += 1;
            self.stats.set(stats);
            debug!(
                from = old_capacity,
                to = new_capacity,
                live = count,
                "safe queue grown"
            );

            if free >= self.config.safety_margin {
                return;
            }
        }
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.ring.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.borrow().capacity()
    }

    /// `capacity - len - 1`, never negative
    pub fn free_slots(&self) -> usize {
        self.ring.borrow().free_slots()
    }

    pub fn is_growing(&self) -> bool {
        self.growing.get()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.get()
    }

    pub fn config(&self) -> &SafeQueueConfig {
        &self.config
    }

    /// Drop every live item. Capacity is kept.
    pub fn clear(&self) {
        self.ring.borrow_mut().clear();
    }
}

impl<T: Clone> SafeQueue<T> {
    /// Copy of the live items, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        let ring = self.ring.borrow();
        let cap = ring.capacity();
        (0..ring.len())
            .filter_map(|i| ring.slots[(ring.read + i) % cap].clone())
            .collect()
    }
}

impl<T> Default for SafeQueue<T> {
    fn default() -> Self {
        Self::build(SafeQueueConfig::default())
    }
}

impl<T> fmt::Debug for SafeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("growing", &self.growing.get())
            .field("stats", &self.stats.get())
            .finish()
    }
}

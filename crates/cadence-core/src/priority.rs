//! Idle task priorities, identities and completion status
//!
//! Idle work is scheduled in three tiers:
//! - High: drained first, can indefinitely delay lower tiers
//! - Medium: runs once High is empty
//! - Low: runs only when both higher tiers are empty

use std::fmt;

/// Priority tier of an idle task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Priority {
    High = 0,
    #[default]
    Medium = 1,
    Low = 2,
}

impl Priority {
    /// All tiers in dequeue order
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Tier index (0 = drained first)
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Priority::High),
            1 => Some(Priority::Medium),
            2 => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Stable identity of a registered idle task delegate
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    #[inline]
    pub fn new(id: u64) -> Self {
        TaskId(id)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one invocation of an idle task delegate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Work finished; drop the task from the queue
    Complete,
    /// More work remains; requeue at the tail of the same tier
    Incomplete,
}

impl TaskStatus {
    #[inline]
    pub fn is_complete(self) -> bool {
        matches!(self, TaskStatus::Complete)
    }
}

impl From<bool> for TaskStatus {
    fn from(done: bool) -> Self {
        if done {
            TaskStatus::Complete
        } else {
            TaskStatus::Incomplete
        }
    }
}

//! Change detection for watched documents.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Content that needs a new cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub text: String,
    /// True for the first content ever seen.
    pub first: bool,
}

/// Marks the latest content as not yet evaluated, e.g. after the driver dropped its cycle.
#[derive(Debug, Clone, Default)]
pub struct StaleFlag(Arc<AtomicBool>);

impl StaleFlag {
    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Remembers the last content handed out so unchanged polls are ignored.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last: Option<String>,
    stale: StaleFlag,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale_flag(&self) -> StaleFlag {
        self.stale.clone()
    }

    /// Returns the content when it differs from the last poll, or when the last
    /// content was marked stale.
    pub fn poll(&mut self, text: String) -> Option<Change> {
        let stale = self.stale.take();
        if !stale && self.last.as_deref() == Some(text.as_str()) {
            return None;
        }
        let first = self.last.is_none();
        self.last = Some(text.clone());
        Some(Change { text, first })
    }
}

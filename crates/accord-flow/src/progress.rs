//! Hierarchical named progress cursors.
//!
//! Observability only: nothing in the runtime reads a tracker back for
//! correctness. While a sub-flow runs, the parent's cursor exposes the
//! child's current step.

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct ProgressState {
    step: String,
    child: Option<ProgressTracker>,
}

/// Named progress cursor for one flow, composable with a child tracker
/// while a sub-flow runs.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressState>>,
}

impl ProgressTracker {
    /// Fresh tracker with an empty step
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the cursor to `step`
    pub fn set_step(&self, step: impl Into<String>) {
        self.inner.lock().step = step.into();
    }

    /// Expose `child` under this tracker for the duration of a sub-flow
    pub fn push_child(&self, child: &ProgressTracker) {
        self.inner.lock().child = Some(child.clone());
    }

    /// Remove the child tracker after the sub-flow returns
    pub fn pop_child(&self) {
        self.inner.lock().child = None;
    }

    /// Current step, including the active sub-flow's step if one is running
    pub fn current(&self) -> String {
        let state = self.inner.lock();
        match &state.child {
            Some(child) => {
                let nested = child.current();
                if nested.is_empty() {
                    state.step.clone()
                } else if state.step.is_empty() {
                    nested
                } else {
                    format!("{} / {nested}", state.step)
                }
            }
            None => state.step.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_exposes_child_step_while_pushed() {
        let parent = ProgressTracker::new();
        parent.set_step("Notarising");
        let child = ProgressTracker::new();
        child.set_step("Requesting signature");
        parent.push_child(&child);
        assert_eq!(parent.current(), "Notarising / Requesting signature");
        parent.pop_child();
        assert_eq!(parent.current(), "Notarising");
    }
}

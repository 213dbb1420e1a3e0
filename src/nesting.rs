//! Nesting depth of a process spawned from within another process run.

use crate::error::{ProcessError, Result};

/// Default maximum nesting depth.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NestingGuard {
    depth: usize,
}

impl NestingGuard {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    pub fn top_level() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Depth to hand to a process spawned from this one.
    pub fn child_depth(&self) -> usize {
        self.depth + 1
    }

    /// Refuse to start when the current depth exceeds `max`.
    pub fn check(&self, max: usize) -> Result<()> {
        if self.depth > max {
            return Err(ProcessError::RecursionTooDeep {
                depth: self.depth,
                max,
            });
        }
        Ok(())
    }
}

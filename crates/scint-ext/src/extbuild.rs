// SPDX-License-Identifier: MIT OR Apache-2.0

//! Native extension builder collaborator (§6.5): `needs_build?` and
//! `build`. Full compiler invocation against a host interpreter ABI is out
//! of scope per §1, so this module provides the trait the core's
//! preparer builds against plus a no-op implementation that always reports
//! "not needed" — enough to exercise the `build` job type end to end
//! without re-specifying a compiler toolchain driver.
//!
//! [`OutputTail`] models §9's "subprocess output streaming" note: a
//! bounded ring buffer a producer thread writes to and any number of
//! consumers can snapshot without blocking the producer.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("native build failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOutcome {
    pub built: bool,
}

/// Bounded ring buffer of output lines, default capacity 200 (matches the
/// teacher's build-log tail windows). `push` never blocks a consumer;
/// `snapshot` never blocks the producer beyond a short mutex hold.
pub struct OutputTail {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().expect("output tail lock");
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().expect("output tail lock").iter().cloned().collect()
    }
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(200)
    }
}

/// Collaborator interface the preparer's compile stage drives (§6.5).
pub trait ExtensionBuilder: Send + Sync {
    /// Does `gem_dir` require a native-extension compile step at all?
    fn needs_build(&self, gem_dir: &Path) -> bool;

    /// Build `gem_dir`'s native extensions into `bundle_path`, using at most
    /// `compile_slots` concurrent compiler invocations, streaming output
    /// into `tail`.
    fn build(&self, gem_dir: &Path, bundle_path: &Path, compile_slots: usize, tail: &OutputTail) -> Result<BuildOutcome, BuildError>;
}

/// Always reports no native extensions needed. Sufficient to drive the
/// `build` job type's plumbing (scheduling, concurrency cap, follow-up)
/// without a real compiler toolchain.
pub struct NoopExtensionBuilder;

impl ExtensionBuilder for NoopExtensionBuilder {
    fn needs_build(&self, _gem_dir: &Path) -> bool {
        false
    }

    fn build(&self, _gem_dir: &Path, _bundle_path: &Path, _compile_slots: usize, tail: &OutputTail) -> Result<BuildOutcome, BuildError> {
        tail.push("no native extensions declared, skipping compile");
        Ok(BuildOutcome { built: false })
    }
}

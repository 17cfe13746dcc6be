// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concrete stand-ins for the collaborators §6.5 names as external to
//! the installer core: archive extraction, an HTTP download pool, a git
//! fetch/checkout helper, a native-extension builder, and the runtime
//! load-path writer.
//!
//! None of these re-specify the source ecosystem's resolver, archive
//! format, or compiler invocation in full generality — they are the
//! minimal real implementations needed to drive the core pipeline
//! (fetch → assemble → extract → compile → materialize) end to end. This
//! crate intentionally has no dependency on `scint` itself: every type
//! here is expressed in plain paths, strings and URLs so the core crate
//! can depend on it without a cycle.

pub mod archive;
pub mod download;
pub mod extbuild;
pub mod git;
pub mod runtime;

pub use archive::{extract_archive, ArchiveError, ArchiveKind};
pub use download::{DownloadError, DownloadOutcome, DownloadRequest, HttpPool};
pub use extbuild::{BuildOutcome, ExtensionBuilder, NoopExtensionBuilder};
pub use git::{GitCollaborator, GitError};
pub use runtime::{write_runtime_lock, RuntimeError, RuntimeLock};

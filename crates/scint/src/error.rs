// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured error kinds (§7) and their exit-code mapping (§6.1).
//!
//! Each component defines its own `thiserror` error enum scoped to its own
//! concerns (`cache::Error`, `promote::Error`, `scheduler::Error`, ...). This
//! module's [`ScintError`] is the top-level classification the CLI wrapper
//! uses to pick an exit code; component errors convert into it at the
//! boundary where the CLI is the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScintError {
    #[error("dependency manifest: {0}")]
    Manifest(String),

    #[error("lockfile: {0}")]
    Lockfile(String),

    #[error("resolve: {0}")]
    Resolve(String),

    #[error("network: {0}")]
    Network(String),

    #[error("install: {0}")]
    Install(String),

    #[error("compile: {0}")]
    Compile(String),

    #[error("permission: {0}")]
    Permission(String),

    #[error("platform: {0}")]
    Platform(String),

    #[error("cache: {0}")]
    Cache(String),

    #[error("interrupted")]
    Interrupt,
}

impl ScintError {
    /// Stable exit code used by the CLI wrapper (§6.1).
    pub fn exit_code(&self) -> i32 {
        match self {
            ScintError::Manifest(_) => 4,
            ScintError::Lockfile(_) => 5,
            ScintError::Resolve(_) => 6,
            ScintError::Network(_) => 7,
            ScintError::Install(_) => 8,
            ScintError::Compile(_) => 9,
            ScintError::Permission(_) => 10,
            ScintError::Platform(_) => 11,
            ScintError::Cache(_) => 12,
            ScintError::Interrupt => 130,
        }
    }
}

impl From<crate::cache::layout::Error> for ScintError {
    fn from(err: crate::cache::layout::Error) -> Self {
        ScintError::Cache(err.to_string())
    }
}

impl From<crate::cache::manifest::Error> for ScintError {
    fn from(err: crate::cache::manifest::Error) -> Self {
        ScintError::Cache(err.to_string())
    }
}

impl From<crate::cache::promote::Error> for ScintError {
    fn from(err: crate::cache::promote::Error) -> Self {
        ScintError::Cache(err.to_string())
    }
}

impl From<crate::resolved_input::Error> for ScintError {
    fn from(err: crate::resolved_input::Error) -> Self {
        ScintError::Manifest(err.to_string())
    }
}

impl From<crate::preparer::Error> for ScintError {
    fn from(err: crate::preparer::Error) -> Self {
        match err {
            crate::preparer::Error::Network(e) => ScintError::Network(e.to_string()),
            crate::preparer::Error::Io(e) => ScintError::Install(e.to_string()),
            other => ScintError::Install(other.to_string()),
        }
    }
}

impl From<crate::materializer::Error> for ScintError {
    fn from(err: crate::materializer::Error) -> Self {
        ScintError::Install(err.to_string())
    }
}

impl From<scint_ext::RuntimeError> for ScintError {
    fn from(err: scint_ext::RuntimeError) -> Self {
        ScintError::Install(err.to_string())
    }
}

impl From<crate::config::Error> for ScintError {
    fn from(err: crate::config::Error) -> Self {
        ScintError::Manifest(err.to_string())
    }
}

impl From<std::io::Error> for ScintError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScintError::Permission(err.to_string()),
            _ => ScintError::Install(err.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exit_codes_match_the_documented_table() {
        assert_eq!(ScintError::Manifest(String::new()).exit_code(), 4);
        assert_eq!(ScintError::Lockfile(String::new()).exit_code(), 5);
        assert_eq!(ScintError::Resolve(String::new()).exit_code(), 6);
        assert_eq!(ScintError::Network(String::new()).exit_code(), 7);
        assert_eq!(ScintError::Install(String::new()).exit_code(), 8);
        assert_eq!(ScintError::Compile(String::new()).exit_code(), 9);
        assert_eq!(ScintError::Permission(String::new()).exit_code(), 10);
        assert_eq!(ScintError::Platform(String::new()).exit_code(), 11);
        assert_eq!(ScintError::Cache(String::new()).exit_code(), 12);
        assert_eq!(ScintError::Interrupt.exit_code(), 130);
    }
}

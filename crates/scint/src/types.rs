// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data model (§3): identifiers, the resolved-spec interface
//! consumed from the resolver, plan entries, and scheduler jobs.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Platform qualifier of a [`PackageId`]. `Portable` packages carry no
/// native extensions and install identically everywhere; `Native` packages
/// are keyed to a specific architecture string supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Portable,
    Native(String),
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Portable => write!(f, "portable"),
            Platform::Native(arch) => arch.fmt(f),
        }
    }
}

/// `(name, version, platform)` — the unit of identity for a package. Renders
/// to the "full name" used throughout the cache layout: `name-version` for
/// portable packages, `name-version-platform` for native ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
    pub platform: Platform,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>, platform: Platform) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            platform,
        }
    }

    /// The canonical `full-name` identifier (§3.1, §3.2).
    pub fn full_name(&self) -> String {
        match &self.platform {
            Platform::Portable => format!("{}-{}", self.name, self.version),
            Platform::Native(arch) => format!("{}-{}-{}", self.name, self.version, arch),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.full_name().fmt(f)
    }
}

/// Opaque interpreter+arch compatibility key, e.g. `"rt-3.3.0-arm64-darwin24"`.
/// Supplied by the host environment; the core never interprets its structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbiKey(String);

impl AbiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AbiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AbiKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Tagged union describing where a package's source tree comes from
/// (§3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Registry {
        uri: Url,
    },
    Git {
        uri: Url,
        revision: Option<String>,
        #[serde(rename = "ref")]
        git_ref: Option<String>,
        branch: Option<String>,
        tag: Option<String>,
        submodules: bool,
    },
    Path {
        absolute_path: PathBuf,
    },
    Builtin,
}

impl SourceDescriptor {
    /// The slug-friendly discriminant used in manifests and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::Registry { .. } => "registry",
            SourceDescriptor::Git { .. } => "git",
            SourceDescriptor::Path { .. } => "path",
            SourceDescriptor::Builtin => "builtin",
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, SourceDescriptor::Path { .. })
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, SourceDescriptor::Builtin)
    }
}

/// Minimum fields consumed by the core from the (out-of-scope) resolver,
/// §3.6. `Serialize`/`Deserialize` let the CLI read a set of these
/// directly from a JSON file standing in for the resolver's actual output
/// (§6.5: the resolver itself is out of scope, but the core still needs a
/// concrete boundary representation to be exercised end to end).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSpec {
    pub id: PackageId,
    pub source: SourceDescriptor,
    pub dependencies: Vec<String>,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub needs_extensions: bool,
}

impl ResolvedSpec {
    pub fn full_name(&self) -> String {
        self.id.full_name()
    }
}

/// One action the [`Planner`](crate::planner) can assign to a resolved spec
/// (§3.5, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Skip,
    Link,
    Build,
    Download,
    Builtin,
}

/// `(spec, action)` pair consumed by the scheduler (§3.5).
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub spec: ResolvedSpec,
    pub action: Action,
    pub cached_path: Option<PathBuf>,
    pub target_path: PathBuf,
}

/// The five-phase pipeline's job types, in static priority order
/// (§4.7.1). Lower discriminant dispatches first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    FetchIndex,
    CloneRepo,
    Resolve,
    Build,
    Download,
    Extract,
    Link,
    Binstub,
}

impl JobType {
    /// Static dispatch priority; lower sorts first (§4.7.1 table).
    pub fn priority(self) -> u8 {
        match self {
            JobType::FetchIndex => 0,
            JobType::CloneRepo => 1,
            JobType::Resolve => 2,
            JobType::Build => 3,
            JobType::Download => 4,
            JobType::Extract => 5,
            JobType::Link => 6,
            JobType::Binstub => 7,
        }
    }
}

/// Terminal/non-terminal lifecycle state of a [`Job`](crate::scheduler::Job).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

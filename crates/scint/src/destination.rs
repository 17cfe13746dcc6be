// SPDX-License-Identifier: MIT OR Apache-2.0

//! The install destination directory: where the planner checks for
//! already-installed packages and where the materializer ultimately places
//! cached trees (§4.9, §4.10).

use std::path::{Path, PathBuf};

/// `--path` target directory (§6.1). Lays out three subdirectories:
/// `pkgs/<full-name>/` (the materialized source tree), `specs/<full-name>.spec`
/// (the metadata blob copied alongside it), and `ext/<full-name>/` (a linked
/// or built native-extension bundle, when needed).
#[derive(Debug, Clone)]
pub struct Destination {
    root: PathBuf,
}

impl Destination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pkg_dir(&self, full_name: &str) -> PathBuf {
        self.root.join("pkgs").join(full_name)
    }

    pub fn spec_path(&self, full_name: &str) -> PathBuf {
        self.root.join("specs").join(format!("{full_name}.spec"))
    }

    pub fn ext_dir(&self, full_name: &str) -> PathBuf {
        self.root.join("ext").join(full_name)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Both halves of "already installed" per §4.9: the package
    /// directory and its metadata blob are present in the destination.
    pub fn has_package(&self, full_name: &str) -> bool {
        self.pkg_dir(full_name).is_dir() && self.spec_path(full_name).is_file()
    }

    pub fn has_extension_dir(&self, full_name: &str) -> bool {
        self.ext_dir(full_name).is_dir()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn has_package_requires_both_dir_and_spec() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = Destination::new(tmp.path());
        assert!(!dest.has_package("rack-2.2.8"));

        std::fs::create_dir_all(dest.pkg_dir("rack-2.2.8")).unwrap();
        assert!(!dest.has_package("rack-2.2.8"), "spec blob still missing");

        std::fs::create_dir_all(dest.spec_path("rack-2.2.8").parent().unwrap()).unwrap();
        std::fs::write(dest.spec_path("rack-2.2.8"), b"{}").unwrap();
        assert!(dest.has_package("rack-2.2.8"));
    }
}

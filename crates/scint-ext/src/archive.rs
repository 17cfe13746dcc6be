// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal archive extraction. The source ecosystem's own archive format
//! (metadata + data tarball packed inside an outer tar) is out of scope per
//! §1; this module only has to turn *some* real compressed archive
//! into a directory tree so the fetch → assemble pipeline is exercisable.

use std::fs::File;
use std::io;
use std::path::Path;

use fs_err as fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("unrecognized archive extension: {0}")]
    UnknownKind(String),
}

/// Archive formats this collaborator knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Sniff the archive kind from the file name (the registry always names
    /// `inbound/gems/<full-name>.gem` uniformly, so the kind is carried
    /// alongside rather than sniffed from magic bytes here).
    pub fn from_extension(path: &Path) -> Result<Self, ArchiveError> {
        let name = path.to_string_lossy();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".gem") {
            Ok(ArchiveKind::TarGz)
        } else if name.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else {
            Err(ArchiveError::UnknownKind(name.into_owned()))
        }
    }
}

/// Extract `archive_path` (of the given or sniffed kind) into `dest_dir`,
/// which must already exist. Used by the preparer's assemble stage to turn
/// a registry download into an extracted source tree.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path, kind: Option<ArchiveKind>) -> Result<(), ArchiveError> {
    let kind = match kind {
        Some(k) => k,
        None => ArchiveKind::from_extension(archive_path)?,
    };

    fs::create_dir_all(dest_dir)?;

    match kind {
        ArchiveKind::TarGz => extract_tar_gz(archive_path, dest_dir),
        ArchiveKind::Zip => extract_zip(archive_path, dest_dir),
    }
}

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.unpack(dest_dir)?;
    Ok(())
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(dest_dir)?;
    Ok(())
}

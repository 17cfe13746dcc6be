// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP download pool (§6.5): `download_batch` over a keep-alive
//! connection pool, with checksum verification when the caller supplies
//! one. Handlers in this core run on plain OS threads (§5: "no async
//! runtime"), so this wraps `reqwest`'s blocking client rather than driving
//! an executor.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs_err as fs;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("checksum mismatch: expected {expected}, got {found}")]
    ChecksumMismatch { expected: String, found: String },
}

/// One requested download (§6.5's `{uri, dest, spec, checksum?}`).
pub struct DownloadRequest {
    pub uri: Url,
    pub dest: PathBuf,
    pub checksum: Option<String>,
}

/// Outcome of one [`DownloadRequest`] (§6.5's
/// `{spec, path, size, error?}`, `spec` elided since the caller already has
/// the request it submitted).
pub struct DownloadOutcome {
    pub dest: PathBuf,
    pub size: u64,
    pub error: Option<DownloadError>,
}

/// Keep-alive connection pool over `reqwest::blocking::Client`, with basic
/// auth applied from the request URI's userinfo when present (mirroring the
/// teacher's `registry/plugin` credential application).
pub struct HttpPool {
    client: reqwest::blocking::Client,
}

impl HttpPool {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("building http client");
        Self { client }
    }

    /// Download every request, each already present destination skipped.
    /// Errors are per-request, never abort the batch.
    pub fn download_batch(&self, requests: Vec<DownloadRequest>) -> Vec<DownloadOutcome> {
        requests.into_iter().map(|request| self.download_one(request)).collect()
    }

    fn download_one(&self, request: DownloadRequest) -> DownloadOutcome {
        if let Ok(meta) = std::fs::metadata(&request.dest) {
            return DownloadOutcome {
                dest: request.dest,
                size: meta.len(),
                error: None,
            };
        }

        match self.fetch(&request) {
            Ok(size) => DownloadOutcome {
                dest: request.dest,
                size,
                error: None,
            },
            Err(error) => DownloadOutcome {
                dest: request.dest,
                size: 0,
                error: Some(error),
            },
        }
    }

    fn fetch(&self, request: &DownloadRequest) -> Result<u64, DownloadError> {
        let mut builder = self.client.get(request.uri.clone());
        if !request.uri.username().is_empty() {
            builder = builder.basic_auth(request.uri.username(), request.uri.password());
        }

        let mut response = builder.send()?.error_for_status()?;

        if let Some(parent) = request.dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = sibling_temp(&request.dest);
        let mut hasher = Sha256::new();
        let mut size = 0u64;
        {
            let mut file = fs::File::create(&tmp)?;
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = io::Read::read(&mut response, &mut buf)?;
                if n == 0 {
                    break;
                }
                file.write_all(&buf[..n])?;
                hasher.update(&buf[..n]);
                size += n as u64;
            }
        }

        if let Some(expected) = &request.checksum {
            let found = hex::encode(hasher.finalize());
            if &found != expected {
                let _ = std::fs::remove_file(&tmp);
                return Err(DownloadError::ChecksumMismatch {
                    expected: expected.clone(),
                    found,
                });
            }
        }

        fs::rename(&tmp, &request.dest)?;
        Ok(size)
    }
}

impl Default for HttpPool {
    fn default() -> Self {
        Self::new()
    }
}

fn sibling_temp(dest: &Path) -> PathBuf {
    let file_name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let pid = std::process::id();
    dest.with_file_name(format!(".{file_name}.{pid}.part"))
}

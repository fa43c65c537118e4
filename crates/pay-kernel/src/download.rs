use std::path::Path;

use http::Method;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::client::BaseClient;
use crate::error::{PaymentError, Result};
use crate::options::RequestOptions;
use crate::transport::Transport;

const READ_CHUNK: usize = 64 * 1024;

/// Digest the provider publishes for downloadable files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "SHA256", alias = "sha256")]
    Sha256,
    #[serde(rename = "SHA1", alias = "sha1")]
    Sha1,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Sha1 => "SHA1",
        }
    }
}

/// Remote file to fetch, as returned by the provider's bill endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadDescriptor {
    pub download_url: String,
    /// Expected hex digest. Empty means the endpoint publishes none and
    /// verification is skipped.
    #[serde(default)]
    pub hash_value: String,
    #[serde(default)]
    pub hash_type: HashAlgorithm,
}

impl DownloadDescriptor {
    pub fn new(download_url: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            hash_value: String::new(),
            hash_type: HashAlgorithm::default(),
        }
    }

    pub fn with_hash(mut self, hash_type: HashAlgorithm, hash_value: impl Into<String>) -> Self {
        self.hash_type = hash_type;
        self.hash_value = hash_value.into();
        self
    }
}

/// Progress of a single download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Requesting,
    Streaming,
    Verifying,
    Verified,
    CorruptionDetected,
    Failed,
}

enum ContentHasher {
    Sha256(Sha256),
    Sha1(Sha1),
}

impl ContentHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hashes the whole file at `path`, returning its size and hex digest.
pub async fn file_digest(path: &Path, algorithm: HashAlgorithm) -> Result<(u64, String)> {
    let mut file = File::open(path)
        .await
        .map_err(|e| PaymentError::io(path, e))?;
    let mut hasher = ContentHasher::new(algorithm);
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| PaymentError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((total, hasher.finalize_hex()))
}

fn advance(phase: &mut DownloadPhase, next: DownloadPhase) {
    debug!(from = ?*phase, to = ?next, "download phase");
    *phase = next;
}

impl<T: Transport> BaseClient<T> {
    /// Downloads `descriptor` into `destination` and verifies its digest.
    ///
    /// The body is streamed to disk, then the file is re-read and hashed.
    /// On failure the partial or corrupt file is left in place.
    pub async fn stream_download(
        &self,
        descriptor: &DownloadDescriptor,
        destination: impl AsRef<Path>,
    ) -> Result<u64> {
        let mut phase = DownloadPhase::Idle;
        self.stream_download_with_phase(descriptor, destination, &mut phase).await
    }

    /// Like [`stream_download`](Self::stream_download), leaving the terminal
    /// phase in `phase`: `Verified`, `CorruptionDetected` or `Failed`.
    pub async fn stream_download_with_phase(
        &self,
        descriptor: &DownloadDescriptor,
        destination: impl AsRef<Path>,
        phase: &mut DownloadPhase,
    ) -> Result<u64> {
        let destination = destination.as_ref();
        *phase = DownloadPhase::Idle;
        let result = self.run_download(descriptor, destination, phase).await;
        match &result {
            Ok(bytes) => info!(
                path = %destination.display(),
                bytes,
                phase = ?*phase,
                "download finished"
            ),
            Err(PaymentError::Integrity { .. }) => {
                advance(phase, DownloadPhase::CorruptionDetected);
                warn!(path = %destination.display(), "downloaded content corrupted");
            }
            Err(error) => {
                warn!(
                    path = %destination.display(),
                    failed_at = ?*phase,
                    %error,
                    "download failed"
                );
                advance(phase, DownloadPhase::Failed);
            }
        }
        result
    }

    async fn run_download(
        &self,
        descriptor: &DownloadDescriptor,
        destination: &Path,
        phase: &mut DownloadPhase,
    ) -> Result<u64> {
        advance(phase, DownloadPhase::Requesting);
        let mut file = File::create(destination)
            .await
            .map_err(|e| PaymentError::io(destination, e))?;
        let prepared = self.auth_sign_request(
            &descriptor.download_url,
            Method::GET,
            None,
            RequestOptions::default(),
        )?;

        advance(phase, DownloadPhase::Streaming);
        self.transport()
            .stream_to(&prepared, &mut file)
            .await
            .map_err(|e| e.at_path(destination))?;
        file.flush()
            .await
            .map_err(|e| PaymentError::io(destination, e))?;
        drop(file);

        advance(phase, DownloadPhase::Verifying);
        let algorithm = descriptor.hash_type;
        let (total, actual) = file_digest(destination, algorithm).await?;
        let expected = descriptor.hash_value.trim();
        if expected.is_empty() {
            debug!(path = %destination.display(), "no published digest, skipping verification");
            advance(phase, DownloadPhase::Verified);
            return Ok(total);
        }
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(PaymentError::Integrity {
                algorithm: algorithm.name(),
                expected: expected.to_string(),
                actual,
            });
        }
        advance(phase, DownloadPhase::Verified);
        info!(algorithm = algorithm.name(), "download digest verified");
        Ok(total)
    }
}

//! Content-addressed artifact store.
//!
//! Layout (external collaborator contract):
//!
//! ```text
//! storage_root/<document_uid>/<sha256_of_content>/original/<filename>
//! storage_root/<document_uid>/<sha256_of_content>/extracted.txt
//! storage_root/<document_uid>/<sha256_of_content>/metadata.json
//! ```
//!
//! Hash-based paths make concurrent writes from different batch workers
//! collision-free and idempotent. The document uid itself carries a unique
//! per-ingestion suffix: the same bytes arriving via two different ingestion
//! units must land under two uids, not silently overwrite one another.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::metadata::SourceType;
use crate::IngestError;

/// Processing outcome recorded in `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Succeeded,
    Failed { reason: String },
    Skipped,
}

/// Sidecar record describing one stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub source_type: SourceType,
    pub status: ProcessingStatus,
    /// Which external engine produced the extracted text, e.g. "basic" or
    /// "accurate" (see `config::TableEngine`).
    pub extraction_method: String,
    /// Ingestion wall-clock time, RFC 3339.
    pub ingested_at: String,
    /// Timestamp claimed by the source itself (email date header, fetch
    /// time), verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_date: Option<String>,
}

/// Paths written for one stored artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub content_dir: PathBuf,
    pub original_path: PathBuf,
    pub extracted_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Mint a document uid from a filename stem.
///
/// The uuid suffix is what keeps two ingestions of identical content apart;
/// a pure content hash here caused silent overwrites historically.
pub fn new_document_uid(stem: &str) -> String {
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", sanitized.trim_matches('_'), &suffix[..8])
}

/// Content-addressed store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store one artifact: original bytes, extracted text, sidecar record.
    ///
    /// Idempotent: re-storing identical content under the same uid rewrites
    /// the same paths with the same bytes.
    pub fn store(
        &self,
        document_uid: &str,
        filename: &str,
        content: &[u8],
        extracted_text: &str,
        record: &StoreRecord,
    ) -> Result<StoredArtifact, IngestError> {
        let content_dir = self.root.join(document_uid).join(content_hash(content));
        let original_dir = content_dir.join("original");
        fs::create_dir_all(&original_dir)?;

        let original_path = original_dir.join(filename);
        fs::write(&original_path, content)?;

        let extracted_path = content_dir.join("extracted.txt");
        fs::write(&extracted_path, extracted_text)?;

        let metadata_path = content_dir.join("metadata.json");
        fs::write(&metadata_path, serde_json::to_string_pretty(record)?)?;

        info!(
            uid = document_uid,
            path = %content_dir.display(),
            "stored artifact"
        );

        Ok(StoredArtifact {
            content_dir,
            original_path,
            extracted_path,
            metadata_path,
        })
    }
}

fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

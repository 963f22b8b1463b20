//! Environment-style pipeline configuration.
//!
//! All flags default to the safer/existing behavior when unset or
//! unparseable: URL processing stays off, fetching stays on the simple HTTP
//! path, table extraction stays on the basic engine. A typo in a deployment
//! env file must degrade to known behavior, not to surprise behavior.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_URL_PROCESSING: &str = "ICEGRAPH_URL_PROCESSING";
pub const ENV_FETCH_METHOD: &str = "ICEGRAPH_FETCH_METHOD";
pub const ENV_TABLE_ENGINE: &str = "ICEGRAPH_TABLE_ENGINE";

/// How URL attachments are fetched (the fetching itself is an external
/// collaborator; this only selects which one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    #[default]
    Simple,
    Browser,
}

/// Which external table/OCR engine extracts attachment content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableEngine {
    #[default]
    Basic,
    Accurate,
}

impl TableEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableEngine::Basic => "basic",
            TableEngine::Accurate => "accurate",
        }
    }
}

/// Resolved pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Master switch for URL ingestion. Off unless explicitly enabled.
    pub url_processing_enabled: bool,
    pub fetch_method: FetchMethod,
    pub table_engine: TableEngine,
}

impl PipelineConfig {
    /// Read configuration from process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup (testable without
    /// mutating process-global environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let url_processing_enabled = match lookup(ENV_URL_PROCESSING) {
            None => false,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    warn!(
                        key = ENV_URL_PROCESSING,
                        value = other,
                        "unrecognized flag value, keeping URL processing disabled"
                    );
                    false
                }
            },
        };

        let fetch_method = match lookup(ENV_FETCH_METHOD).as_deref() {
            None => FetchMethod::Simple,
            Some("simple") => FetchMethod::Simple,
            Some("browser") => FetchMethod::Browser,
            Some(other) => {
                warn!(
                    key = ENV_FETCH_METHOD,
                    value = other,
                    "unrecognized fetch method, using simple"
                );
                FetchMethod::Simple
            }
        };

        let table_engine = match lookup(ENV_TABLE_ENGINE).as_deref() {
            None => TableEngine::Basic,
            Some("basic") => TableEngine::Basic,
            Some("accurate") => TableEngine::Accurate,
            Some(other) => {
                warn!(
                    key = ENV_TABLE_ENGINE,
                    value = other,
                    "unrecognized table engine, using basic"
                );
                TableEngine::Basic
            }
        };

        Self {
            url_processing_enabled,
            fetch_method,
            table_engine,
        }
    }
}

use thiserror::Error;

pub mod backend;
pub mod client;
pub mod config_file;
pub mod orchestrator;
pub mod parser;
pub mod record;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use client::{AnthropicClient, ModelBackend, ModelError};
pub use orchestrator::{Upload, UploadSource, is_pdf_path, process_files};
pub use parser::{ParseError, parse_response};
pub use record::{ExtractedRecord, FILENAME_FIELD, FundingSource, NOT_REPORTED, SCHEMA_FIELDS};
pub use session::Session;

/// Environment variable holding the model API credential.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

pub const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} environment variable is not set")]
    MissingApiKey { var: &'static str },
}

/// Why a single file produced no record.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("error reading PDF: {0}")]
    Pdf(#[from] BackendError),
    #[error("error during extraction: {0}")]
    Model(#[from] ModelError),
    #[error("{0}")]
    Parse(#[from] ParseError),
}

/// A file that failed somewhere in the pipeline.
#[derive(Debug)]
pub struct FailedFile {
    pub filename: String,
    pub error: FileError,
}

/// Outcome of one batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<FailedFile>,
    /// Files whose text was cut to the input limit before sending.
    pub truncated: Vec<String>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.filename.clone()).collect()
    }
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Processing {
        index: usize,
        total: usize,
        filename: String,
    },
    Truncated {
        index: usize,
        total: usize,
        filename: String,
        original_chars: usize,
        kept_chars: usize,
    },
    Extracted {
        index: usize,
        total: usize,
        filename: String,
    },
    Failed {
        index: usize,
        total: usize,
        filename: String,
        error: String,
    },
}

/// Model endpoint settings. The credential is kept separately, see
/// [`resolve_api_key`]. Sampling parameters and the input limit are fixed,
/// see [`client::MAX_TOKENS`], [`client::TEMPERATURE`] and
/// [`client::MAX_INPUT_CHARS`].
#[derive(Debug, Clone)]
pub struct Config {
    pub model: String,
    pub base_url: String,
    pub api_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl Config {
    /// Defaults overlaid with whatever the config file sets.
    pub fn from_file(file: &config_file::ConfigFile) -> Self {
        let mut config = Config::default();
        if let Some(m) = &file.model {
            if let Some(name) = &m.name {
                config.model = name.clone();
            }
            if let Some(url) = &m.base_url {
                config.base_url = url.clone();
            }
            if let Some(v) = &m.api_version {
                config.api_version = v.clone();
            }
        }
        config
    }
}

/// Read the API key from the process environment.
pub fn resolve_api_key() -> Result<String, ConfigError> {
    api_key_from(std::env::var(API_KEY_VAR).ok())
}

/// Validate a credential value; empty or whitespace-only counts as missing.
pub fn api_key_from(value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::MissingApiKey { var: API_KEY_VAR }),
    }
}

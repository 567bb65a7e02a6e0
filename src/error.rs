//! Error types for certificate discovery and selection.

use thiserror::Error;

use crate::matcher::ExtensionCriterion;
use crate::store::{Principal, StoreScope};

pub type Result<T> = std::result::Result<T, CertStoreError>;

/// Only `StoreOpen`, `NoMatch` and `Export` leave the selection engine.
/// Per-candidate skips (missing extension, no private key, failed dry-run
/// export) are filtering outcomes and never surface here.
#[derive(Debug, Error)]
pub enum CertStoreError {
    #[error("Could not open certificate store {principal}\\{store_name}: {cause}")]
    StoreOpen {
        store_name: String,
        principal: Principal,
        #[source]
        cause: std::io::Error,
    },

    #[error("No valid certificate in {scope} matches {criterion}")]
    NoMatch {
        scope: StoreScope,
        criterion: ExtensionCriterion,
    },

    #[error("Private key export failed for certificate '{friendly_name}': {cause}")]
    Export {
        friendly_name: String,
        #[source]
        cause: std::io::Error,
    },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CertStoreError {
    /// True for the three failures the selection engine itself can raise.
    #[must_use]
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            Self::StoreOpen { .. } | Self::NoMatch { .. } | Self::Export { .. }
        )
    }
}

//! Extension Matcher
//!
//! Decides whether a certificate's extension set satisfies a criterion.
//! Absence and undecodable extension data are both a plain non-match.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::x509::{CertificateView, KEY_USAGE_OID};

/// Key-usage flag required when the caller names no extension at all.
pub const DEFAULT_KEY_USAGE: &str = "Digital Signature";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionCriterion {
    /// Extension `oid` is present and its rendered text contains `value`.
    ByObjectIdentifier { oid: String, value: String },
    /// The key-usage extension lists this flag, e.g. `"Digital Signature"`.
    WellKnownKeyUsage(String),
    /// Extension `oid` is present, whatever its content.
    Present(String),
}

impl ExtensionCriterion {
    /// The criterion used to find a code-signing certificate.
    #[must_use]
    pub fn digital_signature() -> Self {
        Self::WellKnownKeyUsage(DEFAULT_KEY_USAGE.to_string())
    }

    #[must_use]
    pub fn oid(&self) -> &str {
        match self {
            Self::ByObjectIdentifier { oid, .. } | Self::Present(oid) => oid,
            Self::WellKnownKeyUsage(_) => KEY_USAGE_OID,
        }
    }

    /// Expected text, or `None` when presence alone qualifies.
    #[must_use]
    pub fn expected_value(&self) -> Option<&str> {
        match self {
            Self::ByObjectIdentifier { value, .. } | Self::WellKnownKeyUsage(value) => Some(value),
            Self::Present(_) => None,
        }
    }
}

impl Default for ExtensionCriterion {
    fn default() -> Self {
        Self::digital_signature()
    }
}

impl fmt::Display for ExtensionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByObjectIdentifier { oid, value } => write!(f, "extension {oid} = '{value}'"),
            Self::WellKnownKeyUsage(value) => write!(f, "key usage '{value}'"),
            Self::Present(oid) => write!(f, "extension {oid} present"),
        }
    }
}

/// True when `view` carries the extension and it renders to text containing
/// the expected value.
#[must_use]
pub fn matches(view: &CertificateView, criterion: &ExtensionCriterion) -> bool {
    let Some(ext) = view.extension(criterion.oid()) else {
        return false;
    };

    let Some(expected) = criterion.expected_value() else {
        return true;
    };

    match ext.rendered.as_deref() {
        Some(text) => text.contains(expected),
        None => {
            log::debug!("Extension {} could not be decoded, skipping", ext.oid);
            false
        }
    }
}

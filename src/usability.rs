//! Usability Gate
//!
//! A certificate is usable for signing only when it has a private key the
//! provider will let us export. The export check is a dry run: nothing is kept.

use crate::store::NativeCertificate;
use crate::x509::CertificateView;

/// Reason attached to a certificate whose key refuses export.
pub const NOT_EXPORTABLE: &str = "private key not exportable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usability {
    pub usable: bool,
    /// Set only for rejections worth reporting. A missing key is the common
    /// case and carries no reason.
    pub reason: Option<String>,
}

impl Usability {
    fn usable() -> Self {
        Self {
            usable: true,
            reason: None,
        }
    }

    fn rejected(reason: Option<String>) -> Self {
        Self {
            usable: false,
            reason,
        }
    }
}

#[must_use]
pub fn is_usable<C: NativeCertificate>(cert: &C) -> Usability {
    if !cert.has_private_key() {
        return Usability::rejected(None);
    }

    match cert.try_export_key() {
        Ok(()) => Usability::usable(),
        Err(e) => {
            log::debug!(
                "Export dry run failed for '{}': {e}",
                cert.friendly_name()
            );
            Usability::rejected(Some(NOT_EXPORTABLE.to_string()))
        }
    }
}

/// Whether the current time falls inside the certificate's validity window.
#[must_use]
pub fn is_time_valid(view: &CertificateView) -> bool {
    view.is_time_valid_at(chrono::Utc::now().timestamp())
}

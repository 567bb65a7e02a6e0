//! Metadata Normalizer
//!
//! Turns a qualifying store entry into a [`CertificateMetadata`] record and,
//! on request, a password-less PKCS#12 export.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};
use zeroize::Zeroizing;

use crate::error::{CertStoreError, Result};
use crate::store::NativeCertificate;
use crate::x509::CertificateView;

/// Canonical description of one selected certificate.
///
/// Equality ignores `export_bytes`: two exports of the same certificate and
/// key differ byte-for-byte because PKCS#12 encoding salts every container.
#[derive(Clone, Serialize)]
pub struct CertificateMetadata {
    #[serde(rename = "FriendlyName")]
    pub friendly_name: String,
    #[serde(rename = "Name")]
    pub subject_name: String,
    #[serde(rename = "IssuerName")]
    pub issuer_name: String,
    #[serde(rename = "EffectiveDateString")]
    pub effective_date: String,
    #[serde(rename = "ExpirationDateString")]
    pub expiration_date: String,
    #[serde(
        rename = "cert",
        serialize_with = "serialize_base64",
        skip_serializing_if = "Option::is_none"
    )]
    pub export_bytes: Option<Zeroizing<Vec<u8>>>,
}

impl PartialEq for CertificateMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.friendly_name == other.friendly_name
            && self.subject_name == other.subject_name
            && self.issuer_name == other.issuer_name
            && self.effective_date == other.effective_date
            && self.expiration_date == other.expiration_date
    }
}

impl Eq for CertificateMetadata {}

impl std::fmt::Debug for CertificateMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMetadata")
            .field("friendly_name", &self.friendly_name)
            .field("subject_name", &self.subject_name)
            .field("issuer_name", &self.issuer_name)
            .field("effective_date", &self.effective_date)
            .field("expiration_date", &self.expiration_date)
            .field(
                "export_bytes",
                &self
                    .export_bytes
                    .as_ref()
                    .map(|bytes| format!("<{} bytes>", bytes.len())),
            )
            .finish()
    }
}

fn serialize_base64<S: Serializer>(
    bytes: &Option<Zeroizing<Vec<u8>>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes.as_slice())),
        None => serializer.serialize_none(),
    }
}

/// Build the record for `cert`, whose parsed form is `view`.
///
/// With `include_bytes`, a failed export is an error rather than a record
/// without bytes: the certificate qualified but cannot be used.
pub fn normalize<C: NativeCertificate>(
    cert: &C,
    view: &CertificateView,
    include_bytes: bool,
) -> Result<CertificateMetadata> {
    let export_bytes = if include_bytes {
        Some(export(cert)?)
    } else {
        None
    };

    Ok(CertificateMetadata {
        friendly_name: cert.friendly_name(),
        subject_name: view.subject.clone(),
        issuer_name: view.issuer.clone(),
        effective_date: view.effective_date_string(),
        expiration_date: view.expiration_date_string(),
        export_bytes,
    })
}

/// Password-less PKCS#12 export of `cert` and its private key.
pub fn export<C: NativeCertificate>(cert: &C) -> Result<Zeroizing<Vec<u8>>> {
    cert.export_pkcs12().map_err(|cause| CertStoreError::Export {
        friendly_name: cert.friendly_name(),
        cause,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyExport;
    use crate::test_support::Fixture;
    use rcgen::KeyUsagePurpose;

    fn fixture() -> Fixture {
        Fixture::new("Alice-Sign", &[KeyUsagePurpose::DigitalSignature])
    }

    #[test]
    fn record_without_bytes() {
        let fixture = fixture();
        let view = CertificateView::from_der(&fixture.der).unwrap();
        let record = normalize(&fixture.entry(), &view, false).unwrap();

        assert_eq!(record.friendly_name, "Alice-Sign");
        assert_eq!(record.subject_name, view.subject);
        assert_eq!(record.issuer_name, view.issuer);
        assert_eq!(record.effective_date, view.effective_date_string());
        assert!(record.export_bytes.is_none());
    }

    #[test]
    fn equality_ignores_export_bytes() {
        let fixture = fixture();
        let view = CertificateView::from_der(&fixture.der).unwrap();
        let with = normalize(&fixture.entry(), &view, true).unwrap();
        let again = normalize(&fixture.entry(), &view, true).unwrap();
        let without = normalize(&fixture.entry(), &view, false).unwrap();

        assert!(with.export_bytes.is_some());
        assert_eq!(with, again);
        assert_eq!(with, without);
    }

    #[test]
    fn late_export_failure_is_an_error() {
        let fixture = fixture();
        let view = CertificateView::from_der(&fixture.der).unwrap();
        let cert = fixture.entry().with_key_export(KeyExport::FailsOnSerialize);

        match normalize(&cert, &view, true) {
            Err(CertStoreError::Export { friendly_name, .. }) => {
                assert_eq!(friendly_name, "Alice-Sign");
            }
            other => panic!("expected export error, got {other:?}"),
        }
        // Without bytes the key is never touched.
        assert!(normalize(&cert, &view, false).is_ok());
    }

    #[test]
    fn debug_hides_bytes() {
        let fixture = fixture();
        let view = CertificateView::from_der(&fixture.der).unwrap();
        let record = normalize(&fixture.entry(), &view, true).unwrap();
        let len = record.export_bytes.as_ref().unwrap().len();

        let printed = format!("{record:?}");
        assert!(printed.contains(&format!("<{len} bytes>")));
    }

    #[test]
    fn json_field_names() {
        let fixture = fixture();
        let view = CertificateView::from_der(&fixture.der).unwrap();

        let record = normalize(&fixture.entry(), &view, false).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["FriendlyName"], "Alice-Sign");
        assert_eq!(json["Name"], view.subject.as_str());
        assert!(json.get("cert").is_none());

        let record = normalize(&fixture.entry(), &view, true).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        let encoded = json["cert"].as_str().unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded.as_slice(), record.export_bytes.unwrap().as_slice());
    }
}

//! Cross-validation of two independently sourced stores
//!
//! Runs the same query against both and compares the resulting records field
//! by field. Export bytes are never compared: every PKCS#12 export is salted.

use serde::Serialize;

use crate::config::QueryConfig;
use crate::error::Result;
use crate::normalize::CertificateMetadata;
use crate::select::{self, SelectOptions};
use crate::store::StoreProvider;

/// Outcome for one field of one record pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldComparison {
    /// Zero-based position of the record in both result lists
    pub index: usize,
    pub field: &'static str,
    pub primary: String,
    pub secondary: String,
    pub matches: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    pub fields: Vec<FieldComparison>,
    pub primary_count: usize,
    pub secondary_count: usize,
    pub all_match: bool,
}

impl ComparisonReport {
    /// Comparisons that failed.
    pub fn mismatches(&self) -> impl Iterator<Item = &FieldComparison> {
        self.fields.iter().filter(|f| !f.matches)
    }
}

/// Compare two records on every field except `export_bytes`.
#[must_use]
pub fn compare_metadata(
    index: usize,
    primary: &CertificateMetadata,
    secondary: &CertificateMetadata,
) -> Vec<FieldComparison> {
    let pairs = [
        ("FriendlyName", &primary.friendly_name, &secondary.friendly_name),
        ("Name", &primary.subject_name, &secondary.subject_name),
        ("IssuerName", &primary.issuer_name, &secondary.issuer_name),
        (
            "EffectiveDateString",
            &primary.effective_date,
            &secondary.effective_date,
        ),
        (
            "ExpirationDateString",
            &primary.expiration_date,
            &secondary.expiration_date,
        ),
    ];

    pairs
        .into_iter()
        .map(|(field, a, b)| FieldComparison {
            index,
            field,
            primary: a.clone(),
            secondary: b.clone(),
            matches: a == b,
        })
        .collect()
}

/// Pairwise comparison of two result lists. Differing lengths never match.
#[must_use]
pub fn compare_results(
    primary: &[CertificateMetadata],
    secondary: &[CertificateMetadata],
) -> ComparisonReport {
    let fields: Vec<FieldComparison> = primary
        .iter()
        .zip(secondary)
        .enumerate()
        .flat_map(|(index, (a, b))| compare_metadata(index, a, b))
        .collect();

    let all_match = primary.len() == secondary.len() && fields.iter().all(|f| f.matches);

    ComparisonReport {
        fields,
        primary_count: primary.len(),
        secondary_count: secondary.len(),
        all_match,
    }
}

/// Run `config` against both providers and compare what they select.
///
/// Any engine error from either side is returned as is.
pub fn cross_validate<P: StoreProvider, Q: StoreProvider>(
    primary: &P,
    secondary: &Q,
    config: &QueryConfig,
) -> Result<ComparisonReport> {
    config.validate()?;

    let options = SelectOptions {
        include_bytes: false,
        require_time_valid: config.require_time_valid,
        verbose: config.verbose,
    };
    let scope = config.scope();
    let criterion = config.criterion();

    let left = select::select_with(primary, &scope, &criterion, config.mode, &options)?;
    let right = select::select_with(secondary, &scope, &criterion, config.mode, &options)?;

    Ok(compare_results(&left.into_vec(), &right.into_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, subject: &str) -> CertificateMetadata {
        CertificateMetadata {
            friendly_name: name.to_string(),
            subject_name: subject.to_string(),
            issuer_name: "CN=Issuer".to_string(),
            effective_date: "1/1/2024 12:00:00 AM".to_string(),
            expiration_date: "12/31/2049 12:00:00 AM".to_string(),
            export_bytes: None,
        }
    }

    #[test]
    fn identical_records_match() {
        let report = compare_results(&[record("A", "CN=A")], &[record("A", "CN=A")]);
        assert!(report.all_match);
        assert_eq!(report.fields.len(), 5);
        assert_eq!(report.mismatches().count(), 0);
    }

    #[test]
    fn reports_the_differing_field() {
        let report = compare_results(&[record("A", "CN=A")], &[record("A", "CN=B")]);
        assert!(!report.all_match);

        let failed: Vec<_> = report.mismatches().map(|f| f.field).collect();
        assert_eq!(failed, ["Name"]);
    }

    #[test]
    fn export_bytes_are_ignored() {
        let mut with_bytes = record("A", "CN=A");
        with_bytes.export_bytes = Some(zeroize::Zeroizing::new(vec![1, 2, 3]));
        assert!(compare_results(&[with_bytes], &[record("A", "CN=A")]).all_match);
    }

    #[test]
    fn length_mismatch_fails() {
        let report = compare_results(&[record("A", "CN=A")], &[]);
        assert!(!report.all_match);
        assert_eq!(report.primary_count, 1);
        assert_eq!(report.secondary_count, 0);
    }
}

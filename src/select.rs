//! Selection Engine
//!
//! Opens one store handle per query, walks it in native order and keeps the
//! certificates that pass the extension matcher and the usability gate.
//! `First` stops at the first survivor; `All` collects every one of them.
//! The handle is released on every return path, errors included.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::QueryConfig;
use crate::error::{CertStoreError, Result};
use crate::matcher::{self, ExtensionCriterion};
use crate::normalize::{self, CertificateMetadata};
use crate::report;
use crate::store::{self, NativeCertificate, StoreProvider, StoreScope};
use crate::usability;
use crate::x509::CertificateView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// The first qualifying certificate in enumeration order
    #[default]
    First,
    /// Every qualifying certificate, in enumeration order
    All,
}

/// Form of each result: raw PKCS#12 bytes or a metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    Bytes,
    #[default]
    Record,
}

/// Per-query filtering switches beyond the criterion itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions {
    pub include_bytes: bool,
    pub require_time_valid: bool,
    pub verbose: bool,
}

/// Engine output, shaped by [`SelectionMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selected {
    One(CertificateMetadata),
    All(Vec<CertificateMetadata>),
}

impl Selected {
    #[must_use]
    pub fn first(&self) -> Option<&CertificateMetadata> {
        match self {
            Self::One(record) => Some(record),
            Self::All(records) => records.first(),
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<CertificateMetadata> {
        match self {
            Self::One(record) => vec![record],
            Self::All(records) => records,
        }
    }
}

/// Caller-facing result, shaped by mode and [`ResultShape`].
#[derive(Debug)]
pub enum QueryResult {
    Bytes(Zeroizing<Vec<u8>>),
    Record(CertificateMetadata),
    BytesList(Vec<Zeroizing<Vec<u8>>>),
    RecordList(Vec<CertificateMetadata>),
}

impl QueryResult {
    /// Number of certificates carried. Single shapes always hold one.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(_) | Self::Record(_) => 1,
            Self::BytesList(items) => items.len(),
            Self::RecordList(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run the engine with default options.
pub fn select<P: StoreProvider>(
    provider: &P,
    scope: &StoreScope,
    criterion: &ExtensionCriterion,
    mode: SelectionMode,
    include_bytes: bool,
) -> Result<Selected> {
    let options = SelectOptions {
        include_bytes,
        ..SelectOptions::default()
    };
    select_with(provider, scope, criterion, mode, &options)
}

pub fn select_with<P: StoreProvider>(
    provider: &P,
    scope: &StoreScope,
    criterion: &ExtensionCriterion,
    mode: SelectionMode,
    options: &SelectOptions,
) -> Result<Selected> {
    let handle = store::open(provider, scope)?;
    let mut selected = Vec::new();

    for cert in handle.enumerate() {
        let Some(view) = qualify(&cert, criterion, options) else {
            continue;
        };

        selected.push(normalize::normalize(&cert, &view, options.include_bytes)?);

        if mode == SelectionMode::First {
            break;
        }
    }

    log::debug!(
        "{} certificate(s) in {} satisfy {criterion}",
        selected.len(),
        handle.scope()
    );

    match mode {
        SelectionMode::First => selected
            .into_iter()
            .next()
            .map(Selected::One)
            .ok_or_else(|| CertStoreError::NoMatch {
                scope: scope.clone(),
                criterion: criterion.clone(),
            }),
        SelectionMode::All => Ok(Selected::All(selected)),
    }
}

/// Apply every per-candidate filter. `None` means skip and keep scanning.
fn qualify<C: NativeCertificate>(
    cert: &C,
    criterion: &ExtensionCriterion,
    options: &SelectOptions,
) -> Option<CertificateView> {
    let view = match CertificateView::from_der(cert.encoded()) {
        Ok(view) => view,
        Err(e) => {
            log::debug!("Skipping '{}': {e}", cert.friendly_name());
            return None;
        }
    };

    if !matcher::matches(&view, criterion) {
        log::debug!("Skipping '{}': does not satisfy {criterion}", cert.friendly_name());
        return None;
    }

    if options.require_time_valid && !usability::is_time_valid(&view) {
        log::debug!("Skipping '{}': outside its validity period", cert.friendly_name());
        return None;
    }

    let usability = usability::is_usable(cert);
    if !usability.usable {
        match usability.reason {
            Some(reason) => {
                log::debug!("Skipping '{}': {reason}", cert.friendly_name());
                if options.verbose {
                    warn!(
                        "The private key of '{}' is not exportable. Re-import the certificate and mark it exportable.",
                        cert.friendly_name()
                    );
                }
            }
            None => log::debug!("Skipping '{}': no private key", cert.friendly_name()),
        }
        return None;
    }

    Some(view)
}

/// Run a configured query and shape the result.
pub fn find_certificate<P: StoreProvider>(provider: &P, config: &QueryConfig) -> Result<QueryResult> {
    config.validate()?;

    let options = SelectOptions {
        include_bytes: config.wants_bytes(),
        require_time_valid: config.require_time_valid,
        verbose: config.verbose,
    };
    let selected = select_with(
        provider,
        &config.scope(),
        &config.criterion(),
        config.mode,
        &options,
    )?;

    if config.verbose
        && let Some(first) = selected.first()
    {
        report::print_summary(first);
    }

    Ok(match (selected, config.shape) {
        (Selected::One(record), ResultShape::Record) => QueryResult::Record(record),
        (Selected::All(records), ResultShape::Record) => QueryResult::RecordList(records),
        (Selected::One(record), ResultShape::Bytes) => QueryResult::Bytes(take_bytes(record)?),
        (Selected::All(records), ResultShape::Bytes) => QueryResult::BytesList(
            records
                .into_iter()
                .map(take_bytes)
                .collect::<Result<Vec<_>>>()?,
        ),
    })
}

/// The current user's first exportable certificate with a `Digital Signature` key usage.
pub fn find_signing_certificate<P: StoreProvider>(
    provider: &P,
    shape: ResultShape,
    verbose: bool,
) -> Result<QueryResult> {
    let config = QueryConfig {
        shape,
        verbose,
        ..QueryConfig::default()
    };
    find_certificate(provider, &config)
}

fn take_bytes(record: CertificateMetadata) -> Result<Zeroizing<Vec<u8>>> {
    let CertificateMetadata {
        friendly_name,
        export_bytes,
        ..
    } = record;
    export_bytes.ok_or_else(|| CertStoreError::Export {
        friendly_name,
        cause: std::io::Error::new(std::io::ErrorKind::NotFound, "no export was produced"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyExport, MemoryStores};
    use crate::test_support::Fixture;
    use rcgen::KeyUsagePurpose;

    fn signing(name: &str) -> Fixture {
        Fixture::new(name, &[KeyUsagePurpose::DigitalSignature])
    }

    fn stores_with(entries: &[crate::store::MemoryCertificate]) -> (MemoryStores, StoreScope) {
        let scope = StoreScope::current_user_personal();
        let mut stores = MemoryStores::new();
        stores.create_store(scope.clone());
        for entry in entries {
            stores.add(&scope, entry.clone());
        }
        (stores, scope)
    }

    #[test]
    fn skips_unusable_candidates_in_order() {
        let encipher = Fixture::new("Encipher", &[KeyUsagePurpose::KeyEncipherment]);
        let (stores, scope) = stores_with(&[
            encipher.entry(),
            signing("NoKey").certificate_only(),
            signing("Locked").entry().with_key_export(KeyExport::Denied),
            signing("Good").entry(),
        ]);

        let selected = select(
            &stores,
            &scope,
            &ExtensionCriterion::digital_signature(),
            SelectionMode::All,
            false,
        )
        .unwrap();

        let names: Vec<_> = selected
            .into_vec()
            .into_iter()
            .map(|r| r.friendly_name)
            .collect();
        assert_eq!(names, ["Good"]);
        assert_eq!(stores.open_handles(), 0);
    }

    #[test]
    fn garbage_entries_are_skipped() {
        let (stores, scope) = stores_with(&[
            crate::store::MemoryCertificate::new(b"junk".to_vec()).with_friendly_name("Junk"),
            signing("Good").entry(),
        ]);

        let selected = select(
            &stores,
            &scope,
            &ExtensionCriterion::digital_signature(),
            SelectionMode::First,
            false,
        )
        .unwrap();
        assert_eq!(selected.first().unwrap().friendly_name, "Good");
    }

    #[test]
    fn record_shape_with_bytes() {
        let (stores, _) = stores_with(&[signing("Alice-Sign").entry()]);
        let config = QueryConfig {
            include_bytes: true,
            ..QueryConfig::default()
        };

        match find_certificate(&stores, &config).unwrap() {
            QueryResult::Record(record) => assert!(record.export_bytes.is_some()),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn bytes_shape_lists() {
        let (stores, _) = stores_with(&[signing("One").entry(), signing("Two").entry()]);
        let config = QueryConfig {
            mode: SelectionMode::All,
            shape: ResultShape::Bytes,
            ..QueryConfig::default()
        };

        let result = find_certificate(&stores, &config).unwrap();
        assert_eq!(result.len(), 2);
        assert!(!result.is_empty());
        match result {
            QueryResult::BytesList(items) => {
                assert_eq!(items.len(), 2);
                assert!(items.iter().all(|b| !b.is_empty()));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn signing_certificate_shortcut() {
        let (stores, _) = stores_with(&[
            Fixture::new("Encipher", &[KeyUsagePurpose::KeyEncipherment]).entry(),
            signing("Alice-Sign").entry(),
        ]);

        match find_signing_certificate(&stores, ResultShape::Bytes, false).unwrap() {
            QueryResult::Bytes(bytes) => assert!(!bytes.is_empty()),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn invalid_config_never_opens_the_store() {
        let (stores, _) = stores_with(&[signing("Alice-Sign").entry()]);
        let config = QueryConfig {
            extension_oid: Some("key usage".into()),
            ..QueryConfig::default()
        };

        assert!(matches!(
            find_certificate(&stores, &config),
            Err(CertStoreError::InvalidConfig(_))
        ));
        assert_eq!(stores.enumerated(), 0);
    }
}

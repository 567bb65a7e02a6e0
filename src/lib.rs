//! Locate a usable signing certificate in an operating-system certificate store.
//!
//! A query opens one store, keeps the certificates whose extension satisfies an
//! [`ExtensionCriterion`] and whose private key can be exported, and returns
//! either metadata records or password-less PKCS#12 exports.

#[macro_use]
pub mod report;

pub mod compare;
pub mod config;
pub mod error;
pub mod matcher;
pub mod normalize;
pub mod select;
pub mod store;
pub mod usability;
pub mod x509;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export common types
pub use compare::{ComparisonReport, FieldComparison, cross_validate};
pub use config::QueryConfig;
pub use error::{CertStoreError, Result};
pub use matcher::ExtensionCriterion;
pub use normalize::CertificateMetadata;
pub use select::{
    QueryResult, ResultShape, Selected, SelectionMode, find_certificate, find_signing_certificate,
    select,
};
pub use store::{MemoryStores, Principal, StoreScope};

#[cfg(windows)]
pub use store::SystemStores;

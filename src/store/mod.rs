//! Scoped, read-only access to an operating-system certificate store
//!
//! # Module Organization
//!
//! - `mod.rs` - store scope, the native binding traits and the scoped [`StoreHandle`]
//! - `memory` - in-memory backend
//! - `windows` - CryptoAPI system store backend (Windows only)
//!
//! The engine never writes to a store. A [`StoreHandle`] is opened for exactly one
//! query and closed on every exit path, including errors raised while filtering.
//! Certificates yielded by an enumeration borrow the store and cannot outlive it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CertStoreError, Result};

pub mod memory;

#[cfg(windows)]
pub mod windows;

pub use memory::{KeyExport, MemoryCertificate, MemoryStores};

#[cfg(windows)]
pub use self::windows::SystemStores;

/// Default store holding the user's personal certificates.
pub const DEFAULT_STORE: &str = "My";

/// Which principal's view of the system stores to open.
///
/// Deserializes through [`FromStr`], so config files accept the same
/// spellings as the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Principal {
    #[default]
    CurrentUser,
    LocalMachine,
    CurrentService,
    Services,
    Users,
    CurrentUserGroupPolicy,
    LocalMachineGroupPolicy,
    LocalMachineEnterprise,
}

impl Principal {
    pub const ALL: [Principal; 8] = [
        Self::CurrentUser,
        Self::LocalMachine,
        Self::CurrentService,
        Self::Services,
        Self::Users,
        Self::CurrentUserGroupPolicy,
        Self::LocalMachineGroupPolicy,
        Self::LocalMachineEnterprise,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentUser => "CurrentUser",
            Self::LocalMachine => "LocalMachine",
            Self::CurrentService => "CurrentService",
            Self::Services => "Services",
            Self::Users => "Users",
            Self::CurrentUserGroupPolicy => "CurrentUserGroupPolicy",
            Self::LocalMachineGroupPolicy => "LocalMachineGroupPolicy",
            Self::LocalMachineEnterprise => "LocalMachineEnterprise",
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Principal {
    type Err = CertStoreError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "currentuser" | "user" => Ok(Self::CurrentUser),
            "localmachine" | "machine" => Ok(Self::LocalMachine),
            "currentservice" | "service" => Ok(Self::CurrentService),
            "services" => Ok(Self::Services),
            "users" => Ok(Self::Users),
            "currentusergrouppolicy" | "currentusergp" => Ok(Self::CurrentUserGroupPolicy),
            "localmachinegrouppolicy" | "localmachinegp" => Ok(Self::LocalMachineGroupPolicy),
            "localmachineenterprise" | "enterprise" => Ok(Self::LocalMachineEnterprise),
            _ => Err(CertStoreError::InvalidConfig(format!(
                "Unknown store principal '{s}': expected CurrentUser or LocalMachine"
            ))),
        }
    }
}

impl TryFrom<String> for Principal {
    type Error = CertStoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Identifies which store to open, e.g. `CurrentUser\My`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreScope {
    pub store_name: String,
    pub principal: Principal,
}

impl StoreScope {
    pub fn new(store_name: impl Into<String>, principal: Principal) -> Self {
        Self {
            store_name: store_name.into(),
            principal,
        }
    }

    /// The current user's personal store (`CurrentUser\My`).
    #[must_use]
    pub fn current_user_personal() -> Self {
        Self::new(DEFAULT_STORE, Principal::CurrentUser)
    }
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\{}", self.principal, self.store_name)
    }
}

/// One certificate entry as exposed by a native store binding.
///
/// Parsing of subject, issuer, validity and extensions happens on the DER
/// returned by [`encoded`](Self::encoded), so every backend renders those
/// fields identically.
pub trait NativeCertificate {
    /// DER encoding of the certificate.
    fn encoded(&self) -> &[u8];

    /// Store-assigned display name; empty when none is set.
    fn friendly_name(&self) -> String;

    fn has_private_key(&self) -> bool;

    /// Attempt a key export without keeping the result.
    fn try_export_key(&self) -> std::io::Result<()>;

    /// Password-less PKCS#12 container holding the certificate and its private key.
    fn export_pkcs12(&self) -> std::io::Result<Zeroizing<Vec<u8>>>;
}

impl<T: NativeCertificate + ?Sized> NativeCertificate for &T {
    fn encoded(&self) -> &[u8] {
        (**self).encoded()
    }

    fn friendly_name(&self) -> String {
        (**self).friendly_name()
    }

    fn has_private_key(&self) -> bool {
        (**self).has_private_key()
    }

    fn try_export_key(&self) -> std::io::Result<()> {
        (**self).try_export_key()
    }

    fn export_pkcs12(&self) -> std::io::Result<Zeroizing<Vec<u8>>> {
        (**self).export_pkcs12()
    }
}

/// An open, read-only store.
pub trait CertificateStore {
    type Certificate<'a>: NativeCertificate
    where
        Self: 'a;

    /// Lazily walk the store in native order. Each call re-reads current state.
    fn certificates(&self) -> impl Iterator<Item = Self::Certificate<'_>> + '_;

    /// Release OS resources. Must be idempotent.
    fn close(&mut self);
}

/// Opens stores by scope. Never creates a store that does not exist.
pub trait StoreProvider {
    type Store<'p>: CertificateStore
    where
        Self: 'p;

    fn open_store(&self, scope: &StoreScope) -> std::io::Result<Self::Store<'_>>;
}

/// Scoped acquisition of a store: closes the underlying store when dropped.
pub struct StoreHandle<S: CertificateStore> {
    scope: StoreScope,
    store: S,
    closed: bool,
}

/// Open `scope` through `provider`.
///
/// Failures are surfaced as [`CertStoreError::StoreOpen`] and never retried.
pub fn open<'p, P: StoreProvider>(
    provider: &'p P,
    scope: &StoreScope,
) -> Result<StoreHandle<P::Store<'p>>> {
    let store = provider
        .open_store(scope)
        .map_err(|cause| CertStoreError::StoreOpen {
            store_name: scope.store_name.clone(),
            principal: scope.principal,
            cause,
        })?;

    log::debug!("Opened certificate store {scope}");

    Ok(StoreHandle {
        scope: scope.clone(),
        store,
        closed: false,
    })
}

impl<S: CertificateStore> StoreHandle<S> {
    #[must_use]
    pub fn scope(&self) -> &StoreScope {
        &self.scope
    }

    /// Walk the store. Not restartable: call again for a fresh pass.
    pub fn enumerate(&self) -> impl Iterator<Item = S::Certificate<'_>> + '_ {
        self.store.certificates()
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.store.close();
        self.closed = true;
        log::debug!("Closed certificate store {}", self.scope);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: CertificateStore> Drop for StoreHandle<S> {
    fn drop(&mut self) {
        self.close();
    }
}

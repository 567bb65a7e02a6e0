//! In-memory certificate stores
//!
//! Holds certificates as DER with an optional PKCS#8 private key. Used as the
//! second, independently-sourced backend for cross-validation and as the store
//! behind the selection tests. Counts open handles and enumerated entries so
//! callers can observe handle closure and early termination.

use std::cell::Cell;
use std::collections::HashMap;
use std::io;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::x509::X509;
use zeroize::Zeroizing;

use super::{CertificateStore, NativeCertificate, StoreProvider, StoreScope};

/// Export policy attached to a stored private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyExport {
    #[default]
    Allowed,
    /// The provider refuses every export, including the dry run.
    Denied,
    /// The dry run succeeds but serialization is refused, as when the
    /// provider's policy changes between the two calls.
    FailsOnSerialize,
}

#[derive(Clone)]
pub struct MemoryCertificate {
    der: Vec<u8>,
    friendly_name: String,
    private_key: Option<Zeroizing<Vec<u8>>>,
    key_export: KeyExport,
}

impl MemoryCertificate {
    pub fn new(der: impl Into<Vec<u8>>) -> Self {
        Self {
            der: der.into(),
            friendly_name: String::new(),
            private_key: None,
            key_export: KeyExport::Allowed,
        }
    }

    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = name.into();
        self
    }

    /// Attach a PKCS#8 DER private key.
    #[must_use]
    pub fn with_private_key(mut self, pkcs8_der: impl Into<Vec<u8>>) -> Self {
        self.private_key = Some(Zeroizing::new(pkcs8_der.into()));
        self
    }

    #[must_use]
    pub fn with_key_export(mut self, policy: KeyExport) -> Self {
        self.key_export = policy;
        self
    }

    fn key(&self) -> io::Result<&[u8]> {
        self.private_key
            .as_deref()
            .map(Vec::as_slice)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "certificate has no private key"))
    }
}

impl std::fmt::Debug for MemoryCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCertificate")
            .field("friendly_name", &self.friendly_name)
            .field("der_len", &self.der.len())
            .field("has_private_key", &self.private_key.is_some())
            .field("key_export", &self.key_export)
            .finish()
    }
}

impl NativeCertificate for MemoryCertificate {
    fn encoded(&self) -> &[u8] {
        &self.der
    }

    fn friendly_name(&self) -> String {
        self.friendly_name.clone()
    }

    fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    fn try_export_key(&self) -> io::Result<()> {
        let key = self.key()?;
        if self.key_export == KeyExport::Denied {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "key export policy does not allow export",
            ));
        }
        PKey::private_key_from_der(key).map_err(io::Error::other)?;
        Ok(())
    }

    fn export_pkcs12(&self) -> io::Result<Zeroizing<Vec<u8>>> {
        let key = self.key()?;
        if self.key_export != KeyExport::Allowed {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "key export policy does not allow export",
            ));
        }

        let cert = X509::from_der(&self.der).map_err(io::Error::other)?;
        let pkey = PKey::private_key_from_der(key).map_err(io::Error::other)?;

        let mut builder = Pkcs12::builder();
        if !self.friendly_name.is_empty() {
            builder.name(&self.friendly_name);
        }
        builder.pkey(&pkey).cert(&cert);

        let pkcs12 = builder.build2("").map_err(io::Error::other)?;
        let der = pkcs12.to_der().map_err(io::Error::other)?;
        Ok(Zeroizing::new(der))
    }
}

/// A set of named in-memory stores keyed by scope.
#[derive(Debug, Default)]
pub struct MemoryStores {
    stores: HashMap<StoreScope, Vec<MemoryCertificate>>,
    open_handles: Cell<usize>,
    enumerated: Cell<usize>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store. Existing contents are kept.
    pub fn create_store(&mut self, scope: StoreScope) {
        self.stores.entry(scope).or_default();
    }

    /// Append a certificate, creating the store if needed.
    pub fn add(&mut self, scope: &StoreScope, cert: MemoryCertificate) {
        self.stores.entry(scope.clone()).or_default().push(cert);
    }

    /// Stores currently open and not yet closed.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.open_handles.get()
    }

    /// Entries handed out by enumerations since creation.
    #[must_use]
    pub fn enumerated(&self) -> usize {
        self.enumerated.get()
    }
}

impl StoreProvider for MemoryStores {
    type Store<'p>
        = MemoryStore<'p>
    where
        Self: 'p;

    fn open_store(&self, scope: &StoreScope) -> io::Result<MemoryStore<'_>> {
        let entries = self.stores.get(scope).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("certificate store {scope} does not exist"),
            )
        })?;

        self.open_handles.set(self.open_handles.get() + 1);

        Ok(MemoryStore {
            provider: self,
            entries,
            open: true,
        })
    }
}

pub struct MemoryStore<'p> {
    provider: &'p MemoryStores,
    entries: &'p [MemoryCertificate],
    open: bool,
}

impl CertificateStore for MemoryStore<'_> {
    type Certificate<'a>
        = &'a MemoryCertificate
    where
        Self: 'a;

    fn certificates(&self) -> impl Iterator<Item = Self::Certificate<'_>> + '_ {
        let entries: &[MemoryCertificate] = if self.open { self.entries } else { &[] };
        let counter = &self.provider.enumerated;
        entries.iter().inspect(move |_| counter.set(counter.get() + 1))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.provider
                .open_handles
                .set(self.provider.open_handles.get().saturating_sub(1));
        }
    }
}

impl Drop for MemoryStore<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

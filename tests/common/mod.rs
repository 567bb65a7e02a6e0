//! Shared fixtures: self-signed certificates loaded into in-memory stores.

#![allow(dead_code)]

use kodegen_certstore::StoreScope;
use kodegen_certstore::store::{MemoryCertificate, MemoryStores};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, KeyUsagePurpose, date_time_ymd};

/// Same subject layout as the crate's unit-test fixtures
/// (`C=US, S=Washington, O=Kodegen Test, CN=<name>`).
pub struct TestCert {
    pub der: Vec<u8>,
    pub key: Vec<u8>,
    pub name: String,
}

impl TestCert {
    pub fn new(name: &str, usages: &[KeyUsagePurpose]) -> Self {
        Self::valid_between(name, usages, (2024, 1, 1), (2049, 12, 31))
    }

    /// A signing certificate whose validity window ended in 2001.
    pub fn expired(name: &str) -> Self {
        Self::valid_between(
            name,
            &[KeyUsagePurpose::DigitalSignature],
            (2000, 1, 1),
            (2001, 1, 1),
        )
    }

    fn valid_between(
        name: &str,
        usages: &[KeyUsagePurpose],
        (from_y, from_m, from_d): (i32, u8, u8),
        (to_y, to_m, to_d): (i32, u8, u8),
    ) -> Self {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, "US");
        dn.push(DnType::StateOrProvinceName, "Washington");
        dn.push(DnType::OrganizationName, "Kodegen Test");
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        params.key_usages = usages.to_vec();
        params.not_before = date_time_ymd(from_y, from_m, from_d);
        params.not_after = date_time_ymd(to_y, to_m, to_d);

        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();

        Self {
            der: cert.der().to_vec(),
            key: key.serialize_der(),
            name: name.to_string(),
        }
    }

    pub fn signing(name: &str) -> Self {
        Self::new(name, &[KeyUsagePurpose::DigitalSignature])
    }

    /// Entry with an exportable private key, named after the certificate.
    pub fn entry(&self) -> MemoryCertificate {
        MemoryCertificate::new(self.der.clone())
            .with_friendly_name(self.name.clone())
            .with_private_key(self.key.clone())
    }

    pub fn without_key(&self) -> MemoryCertificate {
        MemoryCertificate::new(self.der.clone()).with_friendly_name(self.name.clone())
    }
}

/// `CurrentUser\My` holding `entries` in order.
pub fn personal_store(entries: Vec<MemoryCertificate>) -> (MemoryStores, StoreScope) {
    let scope = StoreScope::current_user_personal();
    let mut stores = MemoryStores::new();
    stores.create_store(scope.clone());
    for entry in entries {
        stores.add(&scope, entry);
    }
    (stores, scope)
}

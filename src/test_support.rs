//! Certificate fixtures for unit tests.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, date_time_ymd,
};

use crate::store::MemoryCertificate;

pub(crate) struct Fixture {
    pub der: Vec<u8>,
    pub key: Vec<u8>,
    pub name: String,
}

impl Fixture {
    pub fn new(common_name: &str, usages: &[KeyUsagePurpose]) -> Self {
        Self::build(common_name, usages, &[])
    }

    pub fn with_extended(
        common_name: &str,
        usages: &[KeyUsagePurpose],
        extended: &[ExtendedKeyUsagePurpose],
    ) -> Self {
        Self::build(common_name, usages, extended)
    }

    fn build(
        common_name: &str,
        usages: &[KeyUsagePurpose],
        extended: &[ExtendedKeyUsagePurpose],
    ) -> Self {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, "US");
        dn.push(DnType::StateOrProvinceName, "Washington");
        dn.push(DnType::OrganizationName, "Kodegen Test");
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.key_usages = usages.to_vec();
        params.extended_key_usages = extended.to_vec();
        params.not_before = date_time_ymd(2024, 1, 1);
        params.not_after = date_time_ymd(2049, 12, 31);

        let key = KeyPair::generate().expect("generate key pair");
        let cert = params.self_signed(&key).expect("self-sign certificate");

        Self {
            der: cert.der().to_vec(),
            key: key.serialize_der(),
            name: common_name.to_string(),
        }
    }

    /// Store entry carrying the private key, named after the common name.
    pub fn entry(&self) -> MemoryCertificate {
        MemoryCertificate::new(self.der.clone())
            .with_friendly_name(self.name.clone())
            .with_private_key(self.key.clone())
    }

    pub fn certificate_only(&self) -> MemoryCertificate {
        MemoryCertificate::new(self.der.clone()).with_friendly_name(self.name.clone())
    }
}

//! DER certificate parsing and display rendering
//!
//! Every backend hands the engine raw DER. Parsing it here, rather than asking
//! each platform to format fields, keeps subject, issuer, validity and extension
//! text byte-identical across backends.
//!
//! Rendering follows the text the Windows certificate UI produces:
//! - names: RDNs in encoded order, short labels, joined by `", "`, with
//!   multi-valued RDN attributes joined by `" + "`
//! - dates: local time, `M/D/YYYY h:mm:ss AM|PM`
//! - key usage: `Digital Signature, Key Encipherment (a0)`

use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;
use x509_parser::extensions::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, ParsedExtension, X509Extension,
};
use x509_parser::prelude::{FromDer, X509Certificate, X509Name};

/// Key usage extension (`id-ce-keyUsage`).
pub const KEY_USAGE_OID: &str = "2.5.29.15";

/// Extended key usage extension (`id-ce-extKeyUsage`).
pub const EXTENDED_KEY_USAGE_OID: &str = "2.5.29.37";

/// Returned when a store entry's encoding is not a parsable X.509 certificate.
#[derive(Debug, Error)]
#[error("Malformed certificate: {0}")]
pub struct MalformedCertificate(String);

/// One extension with its rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionEntry {
    pub oid: String,
    /// `None` when the extension data could not be decoded.
    pub rendered: Option<String>,
}

/// Owned view of the fields the engine reads from a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateView {
    pub subject: String,
    pub issuer: String,
    /// Seconds since the Unix epoch.
    pub not_before: i64,
    pub not_after: i64,
    pub extensions: Vec<ExtensionEntry>,
}

impl CertificateView {
    pub fn from_der(der: &[u8]) -> Result<Self, MalformedCertificate> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| MalformedCertificate(e.to_string()))?;

        let validity = cert.validity();
        let extensions = cert.extensions().iter().map(extension_entry).collect();

        Ok(Self {
            subject: render_name(cert.subject()),
            issuer: render_name(cert.issuer()),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
            extensions,
        })
    }

    /// First extension with the given dotted OID.
    #[must_use]
    pub fn extension(&self, oid: &str) -> Option<&ExtensionEntry> {
        self.extensions.iter().find(|ext| ext.oid == oid)
    }

    #[must_use]
    pub fn effective_date_string(&self) -> String {
        render_date(self.not_before, &Local)
    }

    #[must_use]
    pub fn expiration_date_string(&self) -> String {
        render_date(self.not_after, &Local)
    }

    /// Whether `now` (Unix seconds) falls inside the validity window, bounds included.
    #[must_use]
    pub fn is_time_valid_at(&self, now: i64) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

/// Format a Unix timestamp the way the platform's date strings read.
pub fn render_date<Tz>(timestamp: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match DateTime::from_timestamp(timestamp, 0) {
        Some(utc) => utc
            .with_timezone(tz)
            .format("%-m/%-d/%Y %-I:%M:%S %p")
            .to_string(),
        None => timestamp.to_string(),
    }
}

fn attribute_label(oid: &str) -> Option<&'static str> {
    Some(match oid {
        "2.5.4.3" => "CN",
        "2.5.4.4" => "SN",
        "2.5.4.5" => "SERIALNUMBER",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "S",
        "2.5.4.9" => "STREET",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "2.5.4.12" => "T",
        "2.5.4.42" => "G",
        "1.2.840.113549.1.9.1" => "E",
        "0.9.2342.19200300.100.1.25" => "DC",
        _ => return None,
    })
}

/// Values containing separators are wrapped in double quotes, with inner
/// quotes doubled.
fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.starts_with(' ')
        || value.ends_with(' ')
        || value
            .chars()
            .any(|c| matches!(c, ',' | '+' | '=' | '"' | '\n' | '<' | '>' | '#' | ';'));

    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub(crate) fn render_name(name: &X509Name<'_>) -> String {
    let rdns: Vec<Vec<String>> = name
        .iter()
        .map(|rdn| {
            rdn.iter()
                .map(|attr| {
                    let oid = attr.attr_type().to_id_string();
                    let label = attribute_label(&oid)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("OID.{oid}"));
                    let value = match attr.as_str() {
                        Ok(text) => quote_value(text),
                        Err(_) => format!("#{}", hex(attr.attr_value().as_bytes())),
                    };
                    format!("{label}={value}")
                })
                .collect()
        })
        .collect();
    join_rdns(&rdns)
}

/// RDNs are separated by `", "`; attributes of a multi-valued RDN by `" + "`.
fn join_rdns(rdns: &[Vec<String>]) -> String {
    rdns.iter()
        .map(|attrs| attrs.join(" + "))
        .collect::<Vec<_>>()
        .join(", ")
}

fn extension_entry(ext: &X509Extension<'_>) -> ExtensionEntry {
    ExtensionEntry {
        oid: ext.oid.to_id_string(),
        rendered: render_extension(ext),
    }
}

fn render_extension(ext: &X509Extension<'_>) -> Option<String> {
    match ext.parsed_extension() {
        ParsedExtension::KeyUsage(usage) => Some(render_key_usage(usage)),
        ParsedExtension::ExtendedKeyUsage(usage) => Some(render_extended_key_usage(usage)),
        ParsedExtension::BasicConstraints(constraints) => {
            Some(render_basic_constraints(constraints))
        }
        ParsedExtension::SubjectKeyIdentifier(id) => Some(hex(id.0)),
        ParsedExtension::ParseError { .. } => None,
        _ => Some(
            der_string(ext.value)
                .map(str::to_string)
                .unwrap_or_else(|| spaced_hex(ext.value)),
        ),
    }
}

const KEY_USAGE_NAMES: [&str; 9] = [
    "Digital Signature",
    "Non-Repudiation",
    "Key Encipherment",
    "Data Encipherment",
    "Key Agreement",
    "Certificate Signing",
    "Off-line CRL Signing, CRL Signing",
    "Encipher Only",
    "Decipher Only",
];

/// Bit `n` of `flags` is bit `n` of the encoded BIT STRING, so the first
/// encoded byte is the low byte with its bits reversed.
fn render_key_usage(usage: &KeyUsage) -> String {
    let names: Vec<&str> = KEY_USAGE_NAMES
        .iter()
        .enumerate()
        .filter(|(bit, _)| usage.flags & (1 << bit) != 0)
        .map(|(_, name)| *name)
        .collect();

    let mut bytes = format!("{:02x}", (usage.flags as u8).reverse_bits());
    if usage.flags & 0x100 != 0 {
        bytes.push_str(" 80");
    }

    if names.is_empty() {
        format!("({bytes})")
    } else {
        format!("{} ({bytes})", names.join(", "))
    }
}

fn render_extended_key_usage(usage: &ExtendedKeyUsage<'_>) -> String {
    let known = [
        (usage.any, "Any Purpose", "2.5.29.37.0"),
        (usage.server_auth, "Server Authentication", "1.3.6.1.5.5.7.3.1"),
        (usage.client_auth, "Client Authentication", "1.3.6.1.5.5.7.3.2"),
        (usage.code_signing, "Code Signing", "1.3.6.1.5.5.7.3.3"),
        (usage.email_protection, "Secure Email", "1.3.6.1.5.5.7.3.4"),
        (usage.time_stamping, "Time Stamping", "1.3.6.1.5.5.7.3.8"),
        (usage.ocsp_signing, "OCSP Signing", "1.3.6.1.5.5.7.3.9"),
    ];

    let mut parts: Vec<String> = known
        .iter()
        .filter(|(set, _, _)| *set)
        .map(|(_, name, oid)| format!("{name} ({oid})"))
        .collect();
    parts.extend(
        usage
            .other
            .iter()
            .map(|oid| format!("Unknown Key Usage ({})", oid.to_id_string())),
    );
    parts.join(", ")
}

fn render_basic_constraints(constraints: &BasicConstraints) -> String {
    let subject = if constraints.ca { "CA" } else { "End Entity" };
    let path_len = constraints
        .path_len_constraint
        .map_or_else(|| "None".to_string(), |n| n.to_string());
    format!("Subject Type={subject}, Path Length Constraint={path_len}")
}

/// Content of a short-form DER UTF8String, PrintableString or IA5String.
fn der_string(value: &[u8]) -> Option<&str> {
    let (&tag, rest) = value.split_first()?;
    let (&len, body) = rest.split_first()?;
    if !matches!(tag, 0x0c | 0x13 | 0x16) || len >= 0x80 || body.len() != len as usize {
        return None;
    }
    std::str::from_utf8(body).ok()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

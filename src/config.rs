//! Query configuration, loaded from TOML or assembled from CLI flags.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CertStoreError, Result};
use crate::matcher::{DEFAULT_KEY_USAGE, ExtensionCriterion};
use crate::select::{ResultShape, SelectionMode};
use crate::store::{DEFAULT_STORE, Principal, StoreScope};

/// Everything needed to run one certificate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// System store name, e.g. `My` or `Root`
    #[serde(default = "default_store")]
    pub store: String,

    #[serde(default)]
    pub principal: Principal,

    /// Dotted OID of the extension to inspect. Key usage when absent.
    #[serde(default)]
    pub extension_oid: Option<String>,

    /// Text the rendered extension must contain
    #[serde(default)]
    pub extension_value: Option<String>,

    #[serde(default)]
    pub mode: SelectionMode,

    /// Attach the PKCS#12 export to record results
    #[serde(default)]
    pub include_bytes: bool,

    #[serde(default)]
    pub shape: ResultShape,

    /// Print the chosen certificate and report skipped candidates
    #[serde(default)]
    pub verbose: bool,

    /// Skip certificates outside their validity window
    #[serde(default)]
    pub require_time_valid: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            principal: Principal::default(),
            extension_oid: None,
            extension_value: None,
            mode: SelectionMode::default(),
            include_bytes: false,
            shape: ResultShape::default(),
            verbose: false,
            require_time_valid: false,
        }
    }
}

impl QueryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.trim().is_empty() {
            return Err(CertStoreError::InvalidConfig(
                "Store name must not be empty".to_string(),
            ));
        }

        if let Some(oid) = &self.extension_oid
            && !is_dotted_oid(oid)
        {
            return Err(CertStoreError::InvalidConfig(format!(
                "Extension OID '{oid}' is not in dotted numeric form (e.g. 2.5.29.15)"
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn scope(&self) -> StoreScope {
        StoreScope::new(self.store.clone(), self.principal)
    }

    /// Resolve the configured OID and value into a criterion.
    ///
    /// No OID means the key-usage extension, defaulting to `Digital Signature`.
    /// An OID without a value only requires the extension to be present.
    #[must_use]
    pub fn criterion(&self) -> ExtensionCriterion {
        match (&self.extension_oid, &self.extension_value) {
            (None, value) => ExtensionCriterion::WellKnownKeyUsage(
                value.clone().unwrap_or_else(|| DEFAULT_KEY_USAGE.to_string()),
            ),
            (Some(oid), Some(value)) => ExtensionCriterion::ByObjectIdentifier {
                oid: oid.clone(),
                value: value.clone(),
            },
            (Some(oid), None) => ExtensionCriterion::Present(oid.clone()),
        }
    }

    /// Whether selected certificates must be exported.
    #[must_use]
    pub fn wants_bytes(&self) -> bool {
        self.shape == ResultShape::Bytes || self.include_bytes
    }
}

fn is_dotted_oid(oid: &str) -> bool {
    let arcs: Vec<&str> = oid.split('.').collect();
    arcs.len() >= 2
        && arcs
            .iter()
            .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()))
}

fn default_store() -> String {
    DEFAULT_STORE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = QueryConfig::from_toml_str("").unwrap();
        assert_eq!(config, QueryConfig::default());
        assert_eq!(config.scope(), StoreScope::current_user_personal());
        assert_eq!(config.criterion(), ExtensionCriterion::digital_signature());
        assert!(!config.wants_bytes());
    }

    #[test]
    fn full_file() {
        let config = QueryConfig::from_toml_str(
            r#"
            store = "Root"
            principal = "local_machine"
            extension_oid = "2.5.29.37"
            extension_value = "Code Signing"
            mode = "all"
            shape = "bytes"
            verbose = true
            require_time_valid = true
            "#,
        )
        .unwrap();

        assert_eq!(config.scope(), StoreScope::new("Root", Principal::LocalMachine));
        assert_eq!(config.mode, SelectionMode::All);
        assert!(config.wants_bytes());
        assert_eq!(
            config.criterion(),
            ExtensionCriterion::ByObjectIdentifier {
                oid: "2.5.29.37".into(),
                value: "Code Signing".into(),
            }
        );
    }

    #[test]
    fn principal_spellings_match_the_cli() {
        for (text, expected) in [
            ("machine", Principal::LocalMachine),
            ("LOCALMACHINE", Principal::LocalMachine),
            ("user", Principal::CurrentUser),
            ("current-user-gp", Principal::CurrentUserGroupPolicy),
        ] {
            let config = QueryConfig::from_toml_str(&format!("principal = \"{text}\"")).unwrap();
            assert_eq!(config.principal, expected, "{text}");
            assert_eq!(text.parse::<Principal>().unwrap(), expected);
        }
    }

    #[test]
    fn criterion_resolution() {
        let config = QueryConfig {
            extension_value: Some("Non-Repudiation".into()),
            ..QueryConfig::default()
        };
        assert_eq!(
            config.criterion(),
            ExtensionCriterion::WellKnownKeyUsage("Non-Repudiation".into())
        );

        let config = QueryConfig {
            extension_oid: Some("2.5.29.19".into()),
            ..QueryConfig::default()
        };
        assert_eq!(
            config.criterion(),
            ExtensionCriterion::Present("2.5.29.19".into())
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            QueryConfig::from_toml_str(r#"extension_oid = "keyUsage""#),
            Err(CertStoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            QueryConfig::from_toml_str(r#"extension_oid = "2..5""#),
            Err(CertStoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            QueryConfig::from_toml_str(r#"store = "  ""#),
            Err(CertStoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            QueryConfig::from_toml_str(r#"principal = "Nobody""#),
            Err(CertStoreError::Toml(_))
        ));
    }
}

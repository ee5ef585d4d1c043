//! Credentials read from configuration
//!
//! The FHIR server password and the object store secret key are held as
//! [`SecretString`]. The value is redacted in `Debug` output, zeroized on
//! drop and only readable through [`secrecy::ExposeSecret`].

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Credential text, only ever handled inside a [`Secret`]
#[derive(Clone, Zeroize, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl CloneableSecret for Credential {}
impl DebugSecret for Credential {}
impl SerializableSecret for Credential {}

/// A configured credential
pub type SecretString = Secret<Credential>;

/// Wraps a credential read from the environment
pub fn secret_string(value: String) -> SecretString {
    Secret::new(Credential(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[derive(Deserialize)]
    struct Auth {
        password: SecretString,
    }

    #[test]
    fn test_credential_is_redacted() {
        let secret = secret_string("fhir-password".to_string());

        assert_eq!(secret.expose_secret().as_str(), "fhir-password");
        assert!(!format!("{secret:?}").contains("fhir-password"));
    }

    #[test]
    fn test_credential_from_toml() {
        let auth: Auth = toml::from_str(r#"password = "miniopass""#).unwrap();
        assert_eq!(auth.password.expose_secret().as_str(), "miniopass");

        let auth: Auth = toml::from_str(r#"password = """#).unwrap();
        assert!(auth.password.expose_secret().is_empty());
    }
}

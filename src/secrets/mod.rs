use crate::error::ConfigError;
use secrecy::Secret;
use std::env;
use std::fs;
use tracing::debug;

pub use secrecy::ExposeSecret;

/// Secret string wrapper that prevents accidental exposure
pub type SecretString = Secret<String>;

/// Resolve a secret reference from the configuration.
///
/// Supports formats:
/// - "env://VAR" - Load from environment variable
/// - "file:///path/to/file" - Load from file, surrounding whitespace trimmed
/// - Any other value is used as-is
pub fn resolve_secret_ref(value: &str) -> Result<SecretString, ConfigError> {
    if let Some(var) = value.strip_prefix("env://") {
        debug!("Resolving environment variable: {}", var);
        env::var(var).map(Secret::new).map_err(|_| {
            ConfigError::new(
                "Store.Password",
                format!("environment variable '{}' not found", var),
            )
        })
    } else if let Some(path) = value.strip_prefix("file://") {
        debug!("Resolving file reference: {}", path);
        fs::read_to_string(path)
            .map(|s| Secret::new(s.trim().to_string()))
            .map_err(|e| {
                ConfigError::new("Store.Password", format!("failed to read {}: {}", path, e))
            })
    } else {
        Ok(Secret::new(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_plain_value() {
        let secret = resolve_secret_ref("hunter2").unwrap();
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn test_env_reference() {
        env::set_var("TINYRP_TEST_SECRET", "from_env");
        let secret = resolve_secret_ref("env://TINYRP_TEST_SECRET").unwrap();
        env::remove_var("TINYRP_TEST_SECRET");

        assert_eq!(secret.expose_secret(), "from_env");
    }

    #[test]
    fn test_missing_env_reference() {
        let err = resolve_secret_ref("env://TINYRP_TEST_SECRET_UNSET").unwrap_err();
        assert_eq!(err.field, "Store.Password");
    }

    #[test]
    fn test_file_reference() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "from_file").unwrap();

        let reference = format!("file://{}", file.path().display());
        let secret = resolve_secret_ref(&reference).unwrap();
        assert_eq!(secret.expose_secret(), "from_file");
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = resolve_secret_ref("hunter2").unwrap();
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }
}

use crate::error::ConfigError;

/// Resolves a mapping's `secret_ref` to a plaintext credential. The resolved
/// value is expected to live only for the duration of the run (§3) — callers
/// should not persist it beyond building a connection string.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, secret_ref: &str) -> Result<String, ConfigError>;
}

/// Looks up `BRIDGE_SECRET_{REF}` (ref upper-cased, non-alphanumerics turned
/// into `_`) in the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretResolver;

impl EnvSecretResolver {
    pub fn env_var_name(secret_ref: &str) -> String {
        let normalized: String = secret_ref
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("BRIDGE_SECRET_{normalized}")
    }
}

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, secret_ref: &str) -> Result<String, ConfigError> {
        let var_name = Self::env_var_name(secret_ref);
        std::env::var(&var_name)
            .map_err(|_| ConfigError::SecretNotFound(secret_ref.to_string(), var_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_env_var_name() {
        assert_eq!(
            EnvSecretResolver::env_var_name("prod-db.password"),
            "BRIDGE_SECRET_PROD_DB_PASSWORD"
        );
    }

    #[test]
    fn resolves_from_environment() {
        unsafe { std::env::set_var("BRIDGE_SECRET_TEST_REF", "s3cr3t") };
        let resolver = EnvSecretResolver;
        assert_eq!(resolver.resolve("test_ref").unwrap(), "s3cr3t");
        unsafe { std::env::remove_var("BRIDGE_SECRET_TEST_REF") };
    }

    #[test]
    fn missing_secret_is_an_error() {
        let resolver = EnvSecretResolver;
        assert!(resolver.resolve("definitely-not-set").is_err());
    }
}

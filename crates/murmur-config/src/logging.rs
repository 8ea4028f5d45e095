// ============================================================================
// Logging Configuration
// ============================================================================

/// Privacy settings for structured logs
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log raw owner ids instead of salted hashes
    pub enable_user_identifiers: bool,
    /// Salt for `log_safe_id`
    pub hash_salt: String,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            enable_user_identifiers: std::env::var("LOG_USER_IDENTIFIERS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            hash_salt: {
                let salt = std::env::var("LOG_HASH_SALT")
                    .unwrap_or_else(|_| "default-salt-please-change".to_string());
                if salt.is_empty() || salt == "default-salt-please-change" {
                    anyhow::bail!("LOG_HASH_SALT must be set to a unique, secret value");
                }
                salt
            },
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_user_identifiers: false,
            hash_salt: "test-salt".to_string(),
        }
    }
}

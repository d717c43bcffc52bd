use std::path::PathBuf;

/// Fatal problems detected before any connection is opened.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Every missing key and every unparsable value of one backend, reported together.
    #[error("{}", describe_env(backend, keys, invalid))]
    MissingEnv {
        backend: &'static str,
        keys: Vec<String>,
        invalid: Vec<String>,
    },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("unknown backend '{0}' (expected one of: redshift, snowflake, bigquery, databricks, fabric, fake)")]
    UnknownBackend(String),

    #[error("failed to read catalog {}: {source}", path.display())]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog {}: {reason}", path.display())]
    CatalogParse { path: PathBuf, reason: String },

    #[error("catalog error: {0}")]
    Catalog(String),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

fn describe_env(backend: &str, keys: &[String], invalid: &[String]) -> String {
    let mut parts = Vec::new();
    if !keys.is_empty() {
        parts.push(format!(
            "missing required environment variables for {}: {}",
            backend,
            keys.join(", ")
        ));
    }
    if !invalid.is_empty() {
        parts.push(format!("invalid values for {}: {}", backend, invalid.join("; ")));
    }
    parts.join("; ")
}

/// Marks an error raised while opening a backend connection.
#[derive(Debug, thiserror::Error)]
#[error("connection to {backend} failed: {message}")]
pub struct ConnectionError {
    pub backend: &'static str,
    pub message: String,
}

pub fn is_config_error(e: &anyhow::Error) -> bool {
    e.chain().any(|c| c.downcast_ref::<ConfigError>().is_some())
}

pub fn is_connection_error(e: &anyhow::Error) -> bool {
    e.chain().any(|c| c.downcast_ref::<ConnectionError>().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_lists_every_key() {
        let e = ConfigError::MissingEnv {
            backend: "snowflake",
            keys: vec!["SNOWFLAKE_ACCOUNT".into(), "SNOWFLAKE_TOKEN".into()],
            invalid: vec![],
        };
        assert_eq!(
            e.to_string(),
            "missing required environment variables for snowflake: SNOWFLAKE_ACCOUNT, SNOWFLAKE_TOKEN"
        );
    }

    #[test]
    fn test_missing_and_invalid_env_share_one_message() {
        let e = ConfigError::MissingEnv {
            backend: "redshift",
            keys: vec!["REDSHIFT_USER".into()],
            invalid: vec!["REDSHIFT_PORT='54x': invalid digit found in string".into()],
        };
        assert_eq!(
            e.to_string(),
            "missing required environment variables for redshift: REDSHIFT_USER; \
             invalid values for redshift: REDSHIFT_PORT='54x': invalid digit found in string"
        );
    }

    #[test]
    fn test_classification_survives_context() {
        let err = anyhow::Error::new(ConfigError::UnknownBackend("oracle".into()))
            .context("loading run configuration");
        assert!(is_config_error(&err));
        assert!(!is_connection_error(&err));

        let err = anyhow::Error::new(ConnectionError {
            backend: "redshift",
            message: "timed out".into(),
        });
        assert!(is_connection_error(&err));
    }
}

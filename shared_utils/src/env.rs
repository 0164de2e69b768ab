use thiserror::Error;

/// Errors raised while reading process environment variables.
#[derive(Debug, Error)]
pub enum EnvError {
    /// An environment variable required by the application is not set.
    #[error("Missing environment variable: {0}")]
    Missing(String),
}

/// Reads an environment variable, returning a structured error if it's missing.
///
/// Empty values are treated as missing.
pub fn get_env_var(name: &str) -> Result<String, EnvError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EnvError::Missing(name.to_string())),
    }
}

/// Reads an optional environment variable. `None` when unset or empty.
pub fn get_env_var_opt(name: &str) -> Option<String> {
    get_env_var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_var_is_structured() {
        let err = get_env_var("SHARED_UTILS_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, EnvError::Missing(ref n) if n == "SHARED_UTILS_TEST_SURELY_UNSET_VAR"));
        assert!(get_env_var_opt("SHARED_UTILS_TEST_SURELY_UNSET_VAR").is_none());
    }
}

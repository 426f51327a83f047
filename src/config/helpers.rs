use std::collections::HashMap;
use std::env::VarError;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;

/// Source of configuration values, keyed by variable name.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read one variable from the process environment.
///
/// Unset is `None`. A value that is not valid UTF-8 is rejected.
pub fn process_env(key: &str) -> Result<Option<String>, ConfigError> {
    env_value(key, std::env::var(key))
}

/// Copy `keys` out of the process environment.
pub fn snapshot_env(keys: &[&str]) -> Result<HashMap<String, String>, ConfigError> {
    let mut vars = HashMap::new();
    for key in keys {
        if let Some(value) = process_env(key)? {
            vars.insert(key.to_string(), value);
        }
    }
    Ok(vars)
}

fn env_value(key: &str, value: Result<String, VarError>) -> Result<Option<String>, ConfigError> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("not valid UTF-8: {:?}", raw),
        }),
    }
}

/// Read a variable, treating empty values as unset.
pub(crate) fn optional_env(lookup: Lookup<'_>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

/// Parse a variable, falling back to `default` when unset.
pub(crate) fn parse_optional_env<T>(
    lookup: Lookup<'_>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(lookup, key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a boolean flag. Accepts `true/false`, `1/0` and `yes/no`.
pub(crate) fn parse_bool_env(
    lookup: Lookup<'_>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match optional_env(lookup, key) {
        Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be 'true' or 'false', got '{}'", raw),
        }),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Load a `.env` file into the process environment.
///
/// With an explicit path the file must exist. Without one, a `.env` in the
/// working directory is loaded if present. Variables already set win.
pub fn load_env_file(path: Option<&Path>) -> Result<(), ConfigError> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map_err(|e| ConfigError::EnvFile(format!("{}: {}", path.display(), e))),
        None => match dotenvy::dotenv() {
            Ok(_) => Ok(()),
            Err(e) if e.not_found() => Ok(()),
            Err(e) => Err(ConfigError::EnvFile(e.to_string())),
        },
    }
}

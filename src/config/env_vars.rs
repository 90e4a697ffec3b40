use std::env;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// `%VAR%` references (Windows style)
    static ref WINDOWS_VAR: Regex = Regex::new(r"%([A-Za-z_][A-Za-z0-9_()]*)%").unwrap();

    /// `${VAR}` and `$VAR` references (POSIX style)
    static ref UNIX_VAR: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Expand Windows-style environment variables (%VAR%).
///
/// Unknown variables are left as written.
pub fn parse_windows_env_vars(path: &str) -> String {
    WINDOWS_VAR
        .replace_all(path, |caps: &Captures| {
            env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Expand Unix-style environment variables ($VAR and ${VAR}).
///
/// Unknown variables are left as written.
pub fn parse_unix_env_vars(path: &str) -> String {
    UNIX_VAR
        .replace_all(path, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Expand both reference styles.
pub fn expand_env_vars(path: &str) -> String {
    let mut result = path.to_string();
    if result.contains('%') {
        result = parse_windows_env_vars(&result);
    }
    if result.contains('$') {
        result = parse_unix_env_vars(&result);
    }
    result
}

//! Utility functions for CLI operations

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;

/// Return singular or plural form based on count
pub fn pluralize<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}

/// Expand tilde in path to home directory
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(rest))
    } else if path == "~" {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home))
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Parse `--var key=value` arguments
pub fn parse_vars(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Invalid variable '{}': expected KEY=VALUE", pair))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("Invalid variable '{}': empty key", pair);
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Ask a yes/no question on stdout; anything but `y` is no
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "note", "notes"), "note");
        assert_eq!(pluralize(0, "note", "notes"), "notes");
    }

    #[test]
    fn test_parse_vars() {
        let vars = parse_vars(&["project=Apollo".to_string(), "eq=a=b".to_string()]).unwrap();
        assert_eq!(vars["project"], "Apollo");
        assert_eq!(vars["eq"], "a=b");

        assert!(parse_vars(&["novalue".to_string()]).is_err());
        assert!(parse_vars(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/srv/notes").unwrap(), PathBuf::from("/srv/notes"));
    }
}

//! Username source
//!
//! Usernames come from the command line and/or a users file with one name
//! per line. Blank lines and `#` comments are skipped, whitespace is trimmed
//! and duplicates are dropped, keeping the first occurrence so the input
//! order survives into the report.

use crate::error::ConfigError;
use std::collections::HashSet;
use std::path::Path;

/// Parse a users file body
pub fn parse_usernames(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Drop repeated names, keeping the first occurrence
pub fn dedupe_ordered(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Collect usernames from arguments first, then from `file`
pub fn load_usernames(args: &[String], file: Option<&Path>) -> Result<Vec<String>, ConfigError> {
    let mut names: Vec<String> = args
        .iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    if let Some(path) = file {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::UsersFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        names.extend(parse_usernames(&text));
    }

    let names = dedupe_ordered(names);
    if names.is_empty() {
        return Err(ConfigError::NoUsernames);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let names = parse_usernames("alice@corp.com\n\n# retired\n  bob@corp.com  \n");
        assert_eq!(names, vec!["alice@corp.com", "bob@corp.com"]);
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let names = dedupe_ordered(["c", "a", "c", "b", "a"].map(String::from));
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_args_then_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.txt");
        std::fs::write(&path, "u2\nu1\n#u9\n").unwrap();

        let names = load_usernames(&["u1".to_string()], Some(&path)).unwrap();
        assert_eq!(names, vec!["u1", "u2"]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(load_usernames(&[], None), Err(ConfigError::NoUsernames)));

        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            load_usernames(&[], Some(&missing)),
            Err(ConfigError::UsersFile { .. })
        ));
    }
}

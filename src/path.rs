//! Path helpers for paths that live on a target host.
//!
//! Clone and image locations are stored as strings because they describe
//! files on whichever machine runs the database server, which may use
//! `\`-separated drive paths or `/`-separated paths regardless of the
//! platform `dbclone` itself runs on. `std::path` is deliberately not used
//! here.

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::sync::OnceLock;

/// A `\\server\share\rest` style path split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPath {
    pub server: String,
    pub share: String,
    /// Remainder below the share, without a leading separator
    pub rest: String,
}

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Separator used by a host path.
///
/// Drive-letter and network paths use `\`; anything else uses whichever
/// separator appears first, defaulting to `/`.
pub fn separator_of(path: &str) -> char {
    if has_drive_prefix(path) || path.starts_with("\\\\") {
        return '\\';
    }
    path.chars().find(|c| is_separator(*c)).unwrap_or('/')
}

/// Strip trailing separators, keeping a bare root (`/`, `C:\`) intact.
pub fn trim_trailing_separator(path: &str) -> &str {
    let trimmed = path.trim_end_matches(is_separator);
    if trimmed.is_empty() && !path.is_empty() {
        return &path[..1];
    }
    if has_drive_prefix(trimmed) && trimmed.len() == 2 && path.len() > 2 {
        return &path[..3];
    }
    trimmed
}

/// Join a file or directory name onto a host directory.
pub fn join(dir: &str, name: &str) -> String {
    let sep = separator_of(dir);
    let dir = trim_trailing_separator(dir);
    let name = name.trim_start_matches(is_separator);
    if dir.ends_with(is_separator) {
        format!("{}{}", dir, name)
    } else {
        format!("{}{}{}", dir, sep, name)
    }
}

/// Final component of a host path.
pub fn file_name(path: &str) -> &str {
    let path = trim_trailing_separator(path);
    match path.rfind(is_separator) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// File name without its last extension.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Last extension of a host path, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Parent directory of a host path.
pub fn parent(path: &str) -> Option<&str> {
    let path = trim_trailing_separator(path);
    let idx = path.rfind(is_separator)?;
    if idx == 0 {
        return Some(&path[..1]);
    }
    if has_drive_prefix(path) && idx == 2 {
        return Some(&path[..3]);
    }
    Some(&path[..idx])
}

/// Whether the path names a network share rather than a local location.
pub fn is_network_path(path: &str) -> bool {
    path.starts_with("\\\\") || path.starts_with("//")
}

fn network_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[\\/]{2}([^\\/]+)[\\/]+([^\\/]+)[\\/]*(.*)$")
            .unwrap_or_else(|e| panic!("invalid network path pattern: {e}"))
    })
}

/// Split a network path into server, share and remainder.
pub fn parse_network_path(path: &str) -> Option<NetworkPath> {
    let caps = network_path_regex().captures(path)?;
    Some(NetworkPath {
        server: caps[1].to_string(),
        share: caps[2].to_string(),
        rest: trim_trailing_separator(&caps[3]).to_string(),
    })
}

/// Match a file name against a glob pattern, ignoring case.
pub fn glob_match(pattern: &str, name: &str) -> Result<bool> {
    let pattern = Pattern::new(pattern).map_err(Error::Glob)?;
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };
    Ok(pattern.matches_with(name, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_detection() {
        assert_eq!(separator_of("C:\\clone"), '\\');
        assert_eq!(separator_of("\\\\srv\\share"), '\\');
        assert_eq!(separator_of("/var/opt/mssql"), '/');
        assert_eq!(separator_of("relative"), '/');
    }

    #[test]
    fn test_trim_trailing_separator() {
        assert_eq!(trim_trailing_separator("C:\\clone\\"), "C:\\clone");
        assert_eq!(trim_trailing_separator("/data/clone//"), "/data/clone");
        assert_eq!(trim_trailing_separator("/data/clone"), "/data/clone");
        assert_eq!(trim_trailing_separator("/"), "/");
        assert_eq!(trim_trailing_separator("C:\\"), "C:\\");
        assert_eq!(trim_trailing_separator(""), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("C:\\clone\\", "DB1_2024.vhdx"), "C:\\clone\\DB1_2024.vhdx");
        assert_eq!(join("C:\\clone", "DB1_2024.vhdx"), "C:\\clone\\DB1_2024.vhdx");
        assert_eq!(join("/data/clone/", "db.qcow2"), "/data/clone/db.qcow2");
        assert_eq!(join("/", "db.qcow2"), "/db.qcow2");
        assert_eq!(join("C:\\", "clone"), "C:\\clone");
    }

    #[test]
    fn test_file_components() {
        assert_eq!(file_name("D:\\images\\DB1_2024.vhdx"), "DB1_2024.vhdx");
        assert_eq!(file_stem("D:\\images\\DB1_2024.vhdx"), "DB1_2024");
        assert_eq!(extension("D:\\images\\DB1_2024.vhdx"), Some("vhdx"));
        assert_eq!(file_stem("/images/db.v1.qcow2"), "db.v1");
        assert_eq!(extension("/images/noext"), None);
        assert_eq!(file_stem("/images/.hidden"), ".hidden");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("D:\\images\\DB1_2024.vhdx"), Some("D:\\images"));
        assert_eq!(parent("D:\\DB1.vhdx"), Some("D:\\"));
        assert_eq!(parent("/db.qcow2"), Some("/"));
        assert_eq!(parent("db.qcow2"), None);
    }

    #[test]
    fn test_network_paths() {
        assert!(is_network_path("\\\\filer\\images\\db.vhdx"));
        assert!(is_network_path("//filer/images"));
        assert!(!is_network_path("C:\\images"));

        let parsed = parse_network_path("\\\\filer\\clones\\team\\").unwrap();
        assert_eq!(parsed.server, "filer");
        assert_eq!(parsed.share, "clones");
        assert_eq!(parsed.rest, "team");

        let bare = parse_network_path("//filer/clones").unwrap();
        assert_eq!(bare.rest, "");
        assert!(parse_network_path("C:\\clones").is_none());
    }

    #[test]
    fn test_glob_match_ignores_case() {
        assert!(glob_match("*.mdf", "DB1.MDF").unwrap());
        assert!(glob_match("*.ldf", "db1_log.ldf").unwrap());
        assert!(!glob_match("*.ndf", "db1.mdf").unwrap());
    }
}

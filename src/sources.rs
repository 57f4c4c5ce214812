//! Sources-manifest parser (C2).
//!
//! Reads a dist-git `sources` file — a list of blobs that live in the
//! lookaside cache rather than in git — into a set of `SourceEntry`.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    Md5,
    Sha512,
}

impl HashType {
    pub fn as_str(self) -> &'static str {
        match self {
            HashType::Md5 => "md5",
            HashType::Sha512 => "sha512",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceEntry {
    pub filename: String,
    pub hash: String,
    pub hashtype: HashType,
}

static MD5_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{32})  (.+)$").unwrap());
static SHA512_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SHA512 \((.+)\) = ([0-9a-fA-F]{128})$").unwrap());

/// Parse a sources manifest at `path`. Returns the empty set if the file is
/// absent. Returns `None` on the first line that matches neither recognised
/// form, logged against `owner` (typically `"ns/comp"`).
pub fn parse_sources(path: &Path, owner: &str) -> Option<HashSet<SourceEntry>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Some(HashSet::new()),
        Err(e) => {
            log::error!("{owner}: failed to read sources manifest {}: {e}", path.display());
            return None;
        }
    };

    let mut entries = HashSet::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(caps) = MD5_LINE.captures(line) {
            entries.insert(SourceEntry {
                filename: caps[2].to_string(),
                hash: caps[1].to_lowercase(),
                hashtype: HashType::Md5,
            });
        } else if let Some(caps) = SHA512_LINE.captures(line) {
            entries.insert(SourceEntry {
                filename: caps[1].to_string(),
                hash: caps[2].to_lowercase(),
                hashtype: HashType::Sha512,
            });
        } else {
            log::error!("{owner}: malformed sources line: {line:?}");
            return None;
        }
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    fn write_sources(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{contents}").unwrap();
        f
    }

    #[test]
    fn absent_file_is_empty_set() {
        let path = Path::new("/nonexistent/sources/path/does-not-exist");
        let set = parse_sources(path, "rpms/foo").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn parses_md5_and_sha512_lines() {
        let f = write_sources(
            "d41d8cd98f00b204e9800998ecf8427e  empty.tar.gz\nSHA512 (big.tar.xz) = cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3\n",
        );
        let set = parse_sources(f.path(), "rpms/foo").unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&SourceEntry {
            filename: "empty.tar.gz".into(),
            hash: "d41d8cd98f00b204e9800998ecf8427e".into(),
            hashtype: HashType::Md5,
        }));
    }

    #[test]
    fn p3_idempotent_across_two_parses() {
        let f = write_sources("d41d8cd98f00b204e9800998ecf8427e  empty.tar.gz\n");
        let a = parse_sources(f.path(), "rpms/foo").unwrap();
        let b = parse_sources(f.path(), "rpms/foo").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn p3_garbage_line_yields_none() {
        let f = write_sources("not a valid sources line at all\n");
        assert!(parse_sources(f.path(), "rpms/foo").is_none());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let f = write_sources("\n\nd41d8cd98f00b204e9800998ecf8427e  empty.tar.gz\n\n");
        let set = parse_sources(f.path(), "rpms/foo").unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn duplicate_filename_distinct_hashes_yields_two_entries() {
        let f = write_sources(
            "d41d8cd98f00b204e9800998ecf8427e  same.tar.gz\nSHA512 (same.tar.gz) = cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3\n",
        );
        let set = parse_sources(f.path(), "rpms/foo").unwrap();
        assert_eq!(set.len(), 2);
    }
}

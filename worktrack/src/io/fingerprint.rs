//! Content fingerprints for trees without version control.
//!
//! A fingerprint set only proves that a snapshot existed; it is never diffed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::error::{TrackError, TrackResult};
use crate::io::config::FingerprintConfig;

/// Walks source-like files and digests their contents.
#[derive(Debug, Clone)]
pub struct ChecksumFallbackProbe {
    config: FingerprintConfig,
}

impl ChecksumFallbackProbe {
    pub fn new(config: FingerprintConfig) -> Self {
        Self { config }
    }

    /// Map of `/`-separated relative path to SHA-256 hex digest.
    ///
    /// Unreadable or oversized files are skipped; a walk error on one entry
    /// does not stop the walk.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn fingerprint(&self, root: &Path) -> BTreeMap<String, String> {
        let excluded = self.config.excluded_dirs.clone();
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && excluded
                        .iter()
                        .any(|name| entry.file_name().to_str() == Some(name.as_str())))
            })
            .build();

        let mut digests = BTreeMap::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(err = %err, "skipping unwalkable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();
            if !self.is_source_like(path) {
                continue;
            }
            let Some(rel) = relative_key(root, path) else {
                continue;
            };
            match self.digest_file(path) {
                Ok(Some(digest)) => {
                    digests.insert(rel, digest);
                }
                Ok(None) => debug!(path = %rel, "skipping oversized file"),
                Err(err) => warn!(err = %err, "skipping unreadable file"),
            }
        }

        debug!(files = digests.len(), "fingerprinted tree");
        digests
    }

    fn is_source_like(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.config
            .extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    fn digest_file(&self, path: &Path) -> TrackResult<Option<String>> {
        let read_failure = |source| TrackError::ReadFailure {
            path: path.to_path_buf(),
            source,
        };
        let meta = fs::metadata(path).map_err(read_failure)?;
        if meta.len() > self.config.max_file_bytes {
            return Ok(None);
        }
        let bytes = fs::read(path).map_err(read_failure)?;
        Ok(Some(sha256_hex(&bytes)))
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, contents).expect("write");
    }

    #[test]
    fn digests_source_files_and_skips_excluded_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write(root, "src/main.rs", "fn main() {}");
        write(root, "README.md", "hello");
        write(root, "image.png", "not source");
        write(root, "node_modules/pkg/index.js", "ignored");
        write(root, "target/debug/build.rs", "ignored");

        let probe = ChecksumFallbackProbe::new(FingerprintConfig::default());
        let digests = probe.fingerprint(root);

        let keys: Vec<&str> = digests.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["README.md", "src/main.rs"]);
        assert_eq!(digests["README.md"], sha256_hex(b"hello"));
    }

    #[test]
    fn oversized_files_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "big.rs", "0123456789");
        let config = FingerprintConfig {
            max_file_bytes: 4,
            ..FingerprintConfig::default()
        };
        let digests = ChecksumFallbackProbe::new(config).fingerprint(temp.path());
        assert!(digests.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_files_are_skipped_and_the_walk_continues() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "a.rs", "fn a() {}");
        write(temp.path(), "locked.rs", "fn locked() {}");
        let locked = temp.path().join("locked.rs");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");
        if fs::read(&locked).is_ok() {
            // Running as root: permission bits do not stop reads.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).expect("chmod");
            return;
        }

        let digests =
            ChecksumFallbackProbe::new(FingerprintConfig::default()).fingerprint(temp.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).expect("chmod");

        let keys: Vec<&str> = digests.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a.rs"]);
    }

    #[test]
    fn extension_match_ignores_case() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "Legacy.TS", "export {}");
        let digests =
            ChecksumFallbackProbe::new(FingerprintConfig::default()).fingerprint(temp.path());
        assert!(digests.contains_key("Legacy.TS"));
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

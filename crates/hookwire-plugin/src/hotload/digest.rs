//! Source change detection by content digest.
//!
//! The digest folds every source file under a unit directory, in
//! lexicographic relative-path order, into one blake3 hash. Each file
//! contributes its length-prefixed relative path and length-prefixed
//! content, so renames and content edits both change the result while
//! timestamps do not.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{PluginError, PluginResult};

/// Directory names never considered part of a unit's source.
pub const IGNORED_DIRS: &[&str] = &["target", ".git", "node_modules"];

/// Computes the content digest of a unit directory.
///
/// Only files whose extension is in `extensions` take part. Any I/O
/// failure is reported as [`PluginError::SourceUnreadable`].
pub fn digest(dir: &Path, extensions: &[String]) -> PluginResult<String> {
    if !dir.is_dir() {
        return Err(PluginError::SourceNotFound(dir.to_path_buf()));
    }

    let mut files = collect_sources(dir, extensions)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = blake3::Hasher::new();
    for (rel, path) in &files {
        let content = std::fs::read(path).map_err(|source| PluginError::SourceUnreadable {
            path: path.clone(),
            source,
        })?;
        let rel = rel.as_bytes();
        hasher.update(&(rel.len() as u64).to_le_bytes());
        hasher.update(rel);
        hasher.update(&(content.len() as u64).to_le_bytes());
        hasher.update(&content);
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(dir = %dir.display(), files = files.len(), digest = %hash, "Source digest computed");
    Ok(hash)
}

/// Returns whether a unit must be rebuilt given the last known digest.
///
/// Digest failures count as "must rebuild".
pub fn needs_rebuild(dir: &Path, extensions: &[String], last_digest: Option<&str>) -> bool {
    let Some(last) = last_digest else {
        return true;
    };
    match digest(dir, extensions) {
        Ok(current) => current != last,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Digest failed, forcing rebuild");
            true
        }
    }
}

/// Returns whether `path` has one of the given extensions.
pub fn has_source_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want == ext))
}

/// Returns whether any component of `path` is an ignored directory.
pub fn is_in_ignored_dir(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| IGNORED_DIRS.contains(&s))
    })
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

/// Collects (normalized relative path, absolute path) pairs.
fn collect_sources(dir: &Path, extensions: &[String]) -> PluginResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_entry(|e| !is_ignored(e)) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            PluginError::SourceUnreadable {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            }
        })?;

        if !entry.file_type().is_file() || !has_source_extension(entry.path(), extensions) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        // Forward slashes keep the digest identical across platforms.
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel, entry.into_path()));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["rs".to_string(), "toml".to_string()]
    }

    fn write_unit(dir: &Path) {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("Cargo.toml"), "[package]\nname = \"unit\"\n").unwrap();
        std::fs::write(dir.join("src/lib.rs"), "pub fn a() {}\n").unwrap();
        std::fs::write(dir.join("README.md"), "ignored").unwrap();
    }

    #[test]
    fn test_digest_is_stable() {
        let tmp = tempfile::tempdir().unwrap();
        write_unit(tmp.path());
        let first = digest(tmp.path(), &exts()).unwrap();
        let second = digest(tmp.path(), &exts()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_single_byte_change_changes_digest() {
        let tmp = tempfile::tempdir().unwrap();
        write_unit(tmp.path());
        let before = digest(tmp.path(), &exts()).unwrap();
        std::fs::write(tmp.path().join("src/lib.rs"), "pub fn b() {}\n").unwrap();
        assert_ne!(before, digest(tmp.path(), &exts()).unwrap());
    }

    #[test]
    fn test_rename_changes_digest() {
        let tmp = tempfile::tempdir().unwrap();
        write_unit(tmp.path());
        let before = digest(tmp.path(), &exts()).unwrap();
        std::fs::rename(tmp.path().join("src/lib.rs"), tmp.path().join("src/core.rs")).unwrap();
        assert_ne!(before, digest(tmp.path(), &exts()).unwrap());
    }

    #[test]
    fn test_non_source_and_target_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        write_unit(tmp.path());
        let before = digest(tmp.path(), &exts()).unwrap();

        std::fs::write(tmp.path().join("README.md"), "changed").unwrap();
        std::fs::create_dir_all(tmp.path().join("target/debug")).unwrap();
        std::fs::write(tmp.path().join("target/debug/build.rs"), "junk").unwrap();
        assert_eq!(before, digest(tmp.path(), &exts()).unwrap());
    }

    #[test]
    fn test_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let err = digest(&tmp.path().join("absent"), &exts()).unwrap_err();
        assert!(matches!(err, PluginError::SourceNotFound(_)));
        assert!(needs_rebuild(&tmp.path().join("absent"), &exts(), Some("abc")));
    }

    #[test]
    fn test_needs_rebuild() {
        let tmp = tempfile::tempdir().unwrap();
        write_unit(tmp.path());
        let last = digest(tmp.path(), &exts()).unwrap();
        assert!(!needs_rebuild(tmp.path(), &exts(), Some(&last)));
        assert!(needs_rebuild(tmp.path(), &exts(), None));

        std::fs::write(tmp.path().join("Cargo.toml"), "[package]\nname = \"unit2\"\n").unwrap();
        assert!(needs_rebuild(tmp.path(), &exts(), Some(&last)));
    }
}

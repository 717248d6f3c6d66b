use crate::error::{ResolveError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-through file cache keyed by resolved path; lives for one analysis run.
#[derive(Debug, Default)]
pub struct SourceCache {
    files: HashMap<PathBuf, Arc<str>>,
    reads: usize,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, path: &Path) -> Result<Arc<str>> {
        if let Some(text) = self.files.get(path) {
            return Ok(Arc::clone(text));
        }

        let bytes = std::fs::read(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ResolveError::SourceNotFound {
                path: path.to_path_buf(),
            },
            _ => ResolveError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let text = String::from_utf8(bytes)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).to_string());

        let text: Arc<str> = Arc::from(text);
        self.files.insert(path.to_path_buf(), Arc::clone(&text));
        self.reads += 1;
        Ok(text)
    }

    /// Number of actual filesystem reads so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

/// Lines `begin..=end` (1-indexed) of `source`, joined with `\n`.
///
/// Out-of-range bounds are clamped; `begin > end` gives an empty string.
pub fn slice_lines(source: &str, begin: usize, end: usize) -> String {
    let start = begin.saturating_sub(1);
    source
        .lines()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn extract_region(cache: &mut SourceCache, path: &Path, begin: usize, end: usize) -> Result<String> {
    let text = cache.read(path)?;
    Ok(slice_lines(&text, begin, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SOURCE: &str = "line1\nline2\r\nline3\nline4\nline5\n";

    #[test]
    fn inclusive_one_indexed_range() {
        assert_eq!(slice_lines(SOURCE, 2, 4), "line2\nline3\nline4");
        assert_eq!(slice_lines(SOURCE, 1, 1), "line1");
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(slice_lines(SOURCE, 4, 99), "line4\nline5");
        assert_eq!(slice_lines(SOURCE, 0, 2), "line1\nline2");
        assert_eq!(slice_lines(SOURCE, 10, 12), "");
    }

    #[test]
    fn inverted_range_is_empty() {
        assert_eq!(slice_lines(SOURCE, 4, 2), "");
    }

    #[test]
    fn cache_reads_each_file_once() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("solver.cpp");
        std::fs::write(&file, SOURCE).unwrap();

        let mut cache = SourceCache::new();
        assert_eq!(extract_region(&mut cache, &file, 1, 2).unwrap(), "line1\nline2");
        std::fs::remove_file(&file).unwrap();
        assert_eq!(extract_region(&mut cache, &file, 5, 5).unwrap(), "line5");
        assert_eq!(cache.reads(), 1);
    }

    #[test]
    fn vanished_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let mut cache = SourceCache::new();
        let err = cache.read(&tmp.path().join("missing.cpp")).unwrap_err();
        assert!(matches!(err, ResolveError::SourceNotFound { .. }));
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("latin1.c");
        std::fs::write(&file, b"int x; /* caf\xe9 */\nint y;\n").unwrap();

        let mut cache = SourceCache::new();
        let text = extract_region(&mut cache, &file, 1, 2).unwrap();
        assert!(text.starts_with("int x; /* caf"));
        assert!(text.ends_with("int y;"));
    }
}

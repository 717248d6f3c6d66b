use crate::config::PathRewriteRule;
use crate::error::{ResolveError, Result};
use crate::profile::Region;
use std::path::PathBuf;

/// Maps module paths recorded on the measurement machine to readable files here.
#[derive(Debug, Clone, Default)]
pub struct SourceLocator {
    rules: Vec<PathRewriteRule>,
}

impl SourceLocator {
    pub fn new(rules: Vec<PathRewriteRule>) -> Self {
        Self { rules }
    }

    pub fn locate(&self, region: &Region) -> Result<PathBuf> {
        let module_path = region.module_path.as_str();
        if module_path.is_empty() {
            return Err(ResolveError::MissingSourceInfo {
                region: region.name.clone(),
            });
        }

        // The first matching rule is authoritative, even when its target is missing.
        if let Some(rewritten) = self.rewrite(module_path) {
            return if rewritten.is_file() {
                Ok(rewritten)
            } else {
                Err(ResolveError::SourceNotFound { path: rewritten })
            };
        }

        let original = PathBuf::from(module_path);
        if original.is_file() {
            Ok(original)
        } else {
            Err(ResolveError::SourceNotFound { path: original })
        }
    }

    /// Apply the first rule whose source prefix matches; `None` if none does.
    pub fn rewrite(&self, module_path: &str) -> Option<PathBuf> {
        self.rules.iter().find_map(|rule| {
            module_path
                .strip_prefix(rule.from.as_str())
                .map(|rest| PathBuf::from(format!("{}{}", rule.to, rest)))
        })
    }
}

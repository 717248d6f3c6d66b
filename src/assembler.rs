//! Per-call-path source context assembly.
//!
//! For a target call path the assembler walks the ancestor chain, pulls each
//! frame's source region through the [`SourceLocator`] and the run's
//! [`SourceCache`], and accumulates the snippets root-to-target under a token
//! budget. Alongside it records, per frame, the direct children that are not
//! on the way to the target; those are handed to the reasoning service as
//! calls to treat as constant.

use crate::callpath::{leaf_name, parent_of, CallPathIndex};
use crate::error::{ResolveError, Result};
use crate::extractor::{extract_region, SourceCache};
use crate::locator::SourceLocator;
use crate::profile::{ProfileTree, Region};
use crate::tokens::TokenCounter;
use serde::Serialize;
use std::path::PathBuf;

pub fn vendor_placeholder(region_name: &str) -> String {
    format!("The source code for region {region_name} is vendor specific, assume a standard implementation.")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    Source { path: PathBuf },
    Vendor,
}

/// One frame's contribution to the assembled text.
#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub call_path: String,
    pub region_name: String,
    #[serde(flatten)]
    pub kind: EntryKind,
    pub text: String,
}

impl ContextEntry {
    /// Exactly what gets appended to the context blob.
    pub fn rendered(&self) -> String {
        match self.kind {
            EntryKind::Source { .. } => format!("{}\n\n", self.text),
            EntryKind::Vendor => format!("{}\n", self.text),
        }
    }
}

/// Result of resolving a single ancestor.
#[derive(Debug)]
pub enum SnippetOutcome {
    Ok(ContextEntry),
    Vendor(ContextEntry),
    SkippedMissingInfo(ResolveError),
    SkippedNotFound(ResolveError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    Within,
    Exceeded,
}

/// Children of `frame` other than the one leading to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameExclusions {
    pub frame: String,
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedAncestor {
    pub call_path: String,
    pub reason: String,
}

/// Everything the reasoning service gets for one call path.
#[derive(Debug, Clone, Serialize)]
pub struct CallPathContext {
    pub call_path: String,
    /// Root-to-target.
    pub entries: Vec<ContextEntry>,
    pub text: String,
    /// Target frame first, then each ancestor up to the root.
    pub exclusions: Vec<FrameExclusions>,
    pub token_count: usize,
    /// The budget stopped accumulation before all ancestors were added.
    pub truncated: bool,
    pub skipped: Vec<SkippedAncestor>,
}

impl CallPathContext {
    /// All excluded names across frames, first occurrence kept.
    pub fn excluded_names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for frame in &self.exclusions {
            for name in &frame.excluded {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not present in the index.
    UnknownCallPath,
    /// A root has no ancestors to take source from.
    RootOnly,
    /// Every ancestor failed to resolve.
    NoContent,
    /// The first piece alone is over budget.
    OverBudget,
}

#[derive(Debug)]
pub enum Assembly {
    Emit(CallPathContext),
    Skip(SkipReason),
}

pub struct ContextAssembler<'a> {
    tree: &'a ProfileTree,
    index: &'a CallPathIndex,
    locator: SourceLocator,
    cache: SourceCache,
    counter: Box<dyn TokenCounter>,
    budget_tokens: usize,
    vendor_module: String,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(
        tree: &'a ProfileTree,
        index: &'a CallPathIndex,
        locator: SourceLocator,
        counter: Box<dyn TokenCounter>,
        budget_tokens: usize,
        vendor_module: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            index,
            locator,
            cache: SourceCache::new(),
            counter,
            budget_tokens,
            vendor_module: vendor_module.into(),
        }
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Target and its prefixes, target first, root excluded.
    pub fn ancestor_chain(&self, target: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = target;
        while let Some(parent) = parent_of(current) {
            if self.index.contains(current) {
                chain.push(current.to_string());
            }
            current = parent;
        }
        chain
    }

    /// Sibling exclusions for every frame from the target up to its root.
    pub fn sibling_exclusions(&self, target: &str) -> Vec<FrameExclusions> {
        let mut frames = Vec::new();
        let mut on_path: Option<&str> = None;
        let mut current = Some(target);

        while let Some(frame) = current {
            let excluded = self
                .index
                .children_of(frame)
                .iter()
                .filter(|child| Some(child.as_str()) != on_path)
                .map(|child| leaf_name(child).to_string())
                .collect();
            frames.push(FrameExclusions {
                frame: frame.to_string(),
                excluded,
            });
            on_path = Some(frame);
            current = parent_of(frame);
        }
        frames
    }

    pub fn assemble(&mut self, target: &str) -> Result<Assembly> {
        if !self.index.contains(target) {
            return Ok(Assembly::Skip(SkipReason::UnknownCallPath));
        }

        let exclusions = self.sibling_exclusions(target);

        let tree = self.tree;
        let mut regions: Vec<(String, &Region)> = Vec::new();
        for call_path in self.ancestor_chain(target) {
            let Some(node) = self.index.get(&call_path).and_then(|id| tree.node(id)) else {
                continue;
            };
            regions.push((call_path, &node.region));
        }

        if regions.is_empty() {
            return Ok(Assembly::Skip(SkipReason::RootOnly));
        }

        let mut text = String::new();
        let mut token_count = 0;
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        let mut budget = BudgetState::Within;

        for (call_path, region) in regions.into_iter().rev() {
            let entry = match self.resolve(&call_path, region)? {
                SnippetOutcome::Ok(entry) | SnippetOutcome::Vendor(entry) => entry,
                SnippetOutcome::SkippedMissingInfo(err) | SnippetOutcome::SkippedNotFound(err) => {
                    tracing::warn!(call_path = %call_path, "{err}");
                    skipped.push(SkippedAncestor {
                        call_path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let candidate = format!("{text}{}", entry.rendered());
            let tokens = self.counter.count(&candidate);
            if tokens > self.budget_tokens {
                tracing::debug!(
                    call_path = %target,
                    tokens,
                    budget = self.budget_tokens,
                    "token budget exceeded; keeping accumulated context"
                );
                budget = BudgetState::Exceeded;
                break;
            }

            text = candidate;
            token_count = tokens;
            entries.push(entry);
        }

        if text.is_empty() {
            let reason = match budget {
                BudgetState::Exceeded => SkipReason::OverBudget,
                BudgetState::Within => SkipReason::NoContent,
            };
            return Ok(Assembly::Skip(reason));
        }

        Ok(Assembly::Emit(CallPathContext {
            call_path: target.to_string(),
            entries,
            text,
            exclusions,
            token_count,
            truncated: budget == BudgetState::Exceeded,
            skipped,
        }))
    }

    /// Resolve one ancestor. Only unexpected I/O failures are returned as `Err`.
    pub fn resolve(&mut self, call_path: &str, region: &Region) -> Result<SnippetOutcome> {
        if region.module_path == self.vendor_module {
            return Ok(SnippetOutcome::Vendor(ContextEntry {
                call_path: call_path.to_string(),
                region_name: region.name.clone(),
                kind: EntryKind::Vendor,
                text: vendor_placeholder(&region.name),
            }));
        }

        match self.read_region(region) {
            Ok((path, text)) => Ok(SnippetOutcome::Ok(ContextEntry {
                call_path: call_path.to_string(),
                region_name: region.name.clone(),
                kind: EntryKind::Source { path },
                text,
            })),
            Err(err @ ResolveError::MissingSourceInfo { .. }) => Ok(SnippetOutcome::SkippedMissingInfo(err)),
            Err(err @ ResolveError::SourceNotFound { .. }) => Ok(SnippetOutcome::SkippedNotFound(err)),
            Err(err) => Err(err),
        }
    }

    fn read_region(&mut self, region: &Region) -> Result<(PathBuf, String)> {
        let path = self.locator.locate(region)?;
        let (Some(begin), Some(end)) = (region.begin_line, region.end_line) else {
            return Err(ResolveError::MissingSourceInfo {
                region: region.name.clone(),
            });
        };
        let text = extract_region(&mut self.cache, &path, begin, end)?;
        Ok((path, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathRewriteRule;
    use crate::profile::RawNode;
    use crate::symbols::PassthroughNormalizer;
    use crate::tokens::CharRatioCounter;
    use std::path::Path;
    use tempfile::TempDir;

    /// Counts characters, so budgets in tests read as string lengths.
    struct CharCounter;

    impl TokenCounter for CharCounter {
        fn count(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    struct Fixture {
        _tmp: TempDir,
        tree: ProfileTree,
        index: CallPathIndex,
        root: PathBuf,
    }

    impl Fixture {
        fn new(roots: impl FnOnce(&Path) -> Vec<RawNode>) -> Self {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path().to_path_buf();
            let tree = ProfileTree::from_roots(roots(&root));
            let index = CallPathIndex::build(&tree, &PassthroughNormalizer);
            Self {
                _tmp: tmp,
                tree,
                index,
                root,
            }
        }

        fn write(&self, name: &str, content: &str) -> String {
            let path = self.root.join(name);
            std::fs::write(&path, content).unwrap();
            path.to_string_lossy().to_string()
        }

        fn assembler(&self, budget: usize) -> ContextAssembler<'_> {
            ContextAssembler::new(
                &self.tree,
                &self.index,
                SourceLocator::default(),
                Box::new(CharCounter),
                budget,
                "MPI",
            )
        }
    }

    fn region(name: &str, module: &Path, begin: usize, end: usize) -> Region {
        Region::new(name, module.to_string_lossy().to_string()).with_lines(begin, end)
    }

    fn emitted(assembly: Assembly) -> CallPathContext {
        match assembly {
            Assembly::Emit(ctx) => ctx,
            Assembly::Skip(reason) => panic!("expected context, got skip: {reason:?}"),
        }
    }

    const APP: &str = "int main() {\n  solve();\n}\nvoid solve() {\n  for (;;) kernel();\n}\nvoid kernel() {}\n";

    fn app_tree(root: &Path) -> Vec<RawNode> {
        let app = root.join("app.cpp");
        vec![RawNode::with_children(
            region("main", &app, 1, 3),
            vec![
                RawNode::with_children(
                    region("solve", &app, 4, 6),
                    vec![
                        RawNode::leaf(region("kernel", &app, 7, 7)),
                        RawNode::leaf(Region::new("MPI_Allreduce", "MPI")),
                    ],
                ),
                RawNode::leaf(region("report", &app, 1, 1)),
            ],
        )]
    }

    #[test]
    fn snippets_are_root_to_target() {
        let fx = Fixture::new(app_tree);
        fx.write("app.cpp", APP);
        let mut asm = fx.assembler(10_000);

        let ctx = emitted(asm.assemble("main->solve->kernel").unwrap());
        let paths: Vec<&str> = ctx.entries.iter().map(|e| e.call_path.as_str()).collect();
        assert_eq!(paths, vec!["main->solve", "main->solve->kernel"]);
        for pair in ctx.entries.windows(2) {
            assert_eq!(parent_of(&pair[1].call_path), Some(pair[0].call_path.as_str()));
        }
        assert_eq!(
            ctx.text,
            "void solve() {\n  for (;;) kernel();\n}\n\nvoid kernel() {}\n\n"
        );
        assert_eq!(ctx.token_count, ctx.text.chars().count());
        assert!(!ctx.truncated);
        assert_eq!(asm.cache().reads(), 1);
    }

    #[test]
    fn ancestor_chain_stops_before_root() {
        let fx = Fixture::new(app_tree);
        let asm = fx.assembler(10);
        assert_eq!(
            asm.ancestor_chain("main->solve->kernel"),
            vec!["main->solve->kernel".to_string(), "main->solve".to_string()]
        );
        assert!(asm.ancestor_chain("main").is_empty());
    }

    #[test]
    fn sibling_exclusion_at_root_frame() {
        let fx = Fixture::new(|root| {
            let m = root.join("m.cpp");
            vec![RawNode::with_children(
                region("A", &m, 1, 1),
                vec![
                    RawNode::with_children(region("B", &m, 1, 1), vec![RawNode::leaf(region("D", &m, 1, 1))]),
                    RawNode::with_children(region("C", &m, 1, 1), vec![RawNode::leaf(region("E", &m, 1, 1))]),
                ],
            )]
        });
        let asm = fx.assembler(10);

        let frames = asm.sibling_exclusions("A->B");
        assert_eq!(
            frames,
            vec![
                FrameExclusions {
                    frame: "A->B".to_string(),
                    excluded: vec!["D".to_string()],
                },
                FrameExclusions {
                    frame: "A".to_string(),
                    excluded: vec!["C".to_string()],
                },
            ]
        );
    }

    #[test]
    fn exclusions_are_flattened_without_duplicates() {
        let fx = Fixture::new(app_tree);
        fx.write("app.cpp", APP);
        let mut asm = fx.assembler(10_000);

        let ctx = emitted(asm.assemble("main->solve").unwrap());
        assert_eq!(ctx.excluded_names(), vec!["kernel", "MPI_Allreduce", "report"]);
    }

    #[test]
    fn vendor_region_uses_placeholder_without_reading() {
        let fx = Fixture::new(|_| {
            vec![RawNode::with_children(
                Region::new("main", "/nonexistent/main.cpp").with_lines(1, 5),
                vec![RawNode::leaf(Region::new("MPI_Bcast", "MPI").with_lines(1, 100))],
            )]
        });
        let mut asm = fx.assembler(10_000);

        let ctx = emitted(asm.assemble("main->MPI_Bcast").unwrap());
        assert_eq!(ctx.entries.len(), 1);
        assert_eq!(ctx.entries[0].kind, EntryKind::Vendor);
        assert_eq!(
            ctx.text,
            "The source code for region MPI_Bcast is vendor specific, assume a standard implementation.\n"
        );
        assert_eq!(asm.cache().reads(), 0);
    }

    #[test]
    fn budget_keeps_only_what_fits() {
        let fx = Fixture::new(|root| {
            let f = root.join("f.cpp");
            vec![RawNode::with_children(
                region("root", &f, 1, 1),
                vec![RawNode::with_children(
                    region("first", &f, 1, 1),
                    vec![RawNode::leaf(region("second", &f, 2, 2))],
                )],
            )]
        });
        fx.write("f.cpp", "abcd\nabc\n");
        let mut asm = fx.assembler(10);

        // "abcd\n\n" is 6 chars; adding "abc\n\n" makes 11.
        let ctx = emitted(asm.assemble("root->first->second").unwrap());
        assert_eq!(ctx.text, "abcd\n\n");
        assert_eq!(ctx.token_count, 6);
        assert!(ctx.truncated);
        assert_eq!(ctx.entries.len(), 1);
    }

    #[test]
    fn first_piece_over_budget_is_skipped() {
        let fx = Fixture::new(app_tree);
        fx.write("app.cpp", APP);
        let mut asm = fx.assembler(3);
        assert!(matches!(
            asm.assemble("main->solve").unwrap(),
            Assembly::Skip(SkipReason::OverBudget)
        ));
    }

    #[test]
    fn failing_ancestor_is_skipped_and_others_kept() {
        let fx = Fixture::new(|root| {
            let present = root.join("present.cpp");
            vec![RawNode::with_children(
                region("main", &present, 1, 1),
                vec![RawNode::with_children(
                    region("lost", &root.join("lost.cpp"), 1, 1),
                    vec![RawNode::leaf(region("leaf", &present, 2, 2))],
                )],
            )]
        });
        fx.write("present.cpp", "int main();\nvoid leaf();\n");
        let mut asm = fx.assembler(1_000);

        let ctx = emitted(asm.assemble("main->lost->leaf").unwrap());
        assert_eq!(ctx.text, "void leaf();\n\n");
        assert_eq!(ctx.skipped.len(), 1);
        assert_eq!(ctx.skipped[0].call_path, "main->lost");
        assert!(ctx.skipped[0].reason.contains("lost.cpp"));
    }

    #[test]
    fn empty_module_only_ancestor_is_skipped() {
        let fx = Fixture::new(|root| {
            vec![RawNode::with_children(
                region("main", &root.join("main.cpp"), 1, 1),
                vec![RawNode::leaf(Region::new("!$omp parallel", ""))],
            )]
        });
        let mut asm = fx.assembler(1_000);

        let region = Region::new("!$omp parallel", "");
        assert!(matches!(
            asm.resolve("main->!$omp parallel", &region).unwrap(),
            SnippetOutcome::SkippedMissingInfo(ResolveError::MissingSourceInfo { .. })
        ));
        assert!(matches!(
            asm.assemble("main->!$omp parallel").unwrap(),
            Assembly::Skip(SkipReason::NoContent)
        ));
    }

    #[test]
    fn roots_and_unknown_paths_are_skipped() {
        let fx = Fixture::new(app_tree);
        let mut asm = fx.assembler(1_000);
        assert!(matches!(asm.assemble("main").unwrap(), Assembly::Skip(SkipReason::RootOnly)));
        assert!(matches!(
            asm.assemble("main->nope").unwrap(),
            Assembly::Skip(SkipReason::UnknownCallPath)
        ));
    }

    #[test]
    fn rewrite_rules_apply_during_assembly() {
        let fx = Fixture::new(|_| {
            vec![RawNode::with_children(
                Region::new("main", "/cluster/home/app/main.cpp").with_lines(1, 1),
                vec![RawNode::leaf(Region::new("step", "/cluster/home/app/step.cpp").with_lines(2, 3))],
            )]
        });
        fx.write("step.cpp", "// step\nvoid step() {\n}\n");

        let locator = SourceLocator::new(vec![PathRewriteRule::new(
            "/cluster/home/app",
            fx.root.to_string_lossy(),
        )]);
        let mut asm = ContextAssembler::new(
            &fx.tree,
            &fx.index,
            locator,
            Box::new(CharRatioCounter { chars_per_token: 4 }),
            1_000,
            "MPI",
        );

        let ctx = emitted(asm.assemble("main->step").unwrap());
        assert_eq!(ctx.text, "void step() {\n}\n\n");
        assert_eq!(
            ctx.entries[0].kind,
            EntryKind::Source {
                path: fx.root.join("step.cpp")
            }
        );
    }
}

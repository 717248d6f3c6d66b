use crate::assembler::{Assembly, CallPathContext, ContextAssembler, SkipReason};
use crate::callpath::CallPathIndex;
use crate::config::Config;
use crate::locator::SourceLocator;
use crate::profile::ProfileTree;
use crate::prompt::build_messages;
use crate::reasoning::{ask_until_answered, extract_complexity, ReasoningService};
use crate::symbols::normalizer_for;
use crate::tokens::counter_from_config;
use anyhow::{Context, Result};
use serde::Serialize;

pub fn build_index(tree: &ProfileTree, cfg: &Config) -> CallPathIndex {
    let normalizer = normalizer_for(cfg.demangle);
    let index = CallPathIndex::build(tree, normalizer.as_ref());
    if index.collisions() > 0 {
        tracing::warn!(
            collisions = index.collisions(),
            "call paths are ambiguous; colliding nodes were collapsed"
        );
    }
    index
}

pub fn build_assembler<'a>(tree: &'a ProfileTree, index: &'a CallPathIndex, cfg: &Config) -> Result<ContextAssembler<'a>> {
    let counter = counter_from_config(&cfg.token_counter)?;
    Ok(ContextAssembler::new(
        tree,
        index,
        SourceLocator::new(cfg.rewrite_rules.clone()),
        counter,
        cfg.budget_tokens,
        cfg.vendor_module.clone(),
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct CallPathResult {
    pub call_path: String,
    /// `None` when the answer carried no `<complexity>` tag.
    pub complexity: Option<String>,
    pub answer: String,
    pub token_count: usize,
    pub truncated: bool,
    pub excluded: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub total_call_paths: usize,
    pub skipped: usize,
    pub results: Vec<CallPathResult>,
}

/// Every call path in index order, assembled; skips are dropped.
pub fn assemble_all(assembler: &mut ContextAssembler<'_>, index: &CallPathIndex) -> Result<Vec<CallPathContext>> {
    let mut out = Vec::new();
    for call_path in index.call_paths() {
        match assembler
            .assemble(call_path)
            .with_context(|| format!("Failed to assemble context for {call_path}"))?
        {
            Assembly::Emit(ctx) => out.push(ctx),
            Assembly::Skip(reason) => log_skip(call_path, reason),
        }
    }
    Ok(out)
}

fn log_skip(call_path: &str, reason: SkipReason) {
    match reason {
        SkipReason::RootOnly => tracing::debug!(call_path, "skipping root call path"),
        other => tracing::info!(call_path, reason = ?other, "skipping call path"),
    }
}

/// Assemble each call path and ask the reasoning service about it, one at a time.
///
/// `on_result` sees every answered call path as soon as it is available.
pub fn analyze(
    tree: &ProfileTree,
    cfg: &Config,
    service: &dyn ReasoningService,
    mut on_result: impl FnMut(&CallPathResult),
) -> Result<RunSummary> {
    let index = build_index(tree, cfg);
    let mut assembler = build_assembler(tree, &index, cfg)?;
    let mut summary = RunSummary {
        total_call_paths: index.len(),
        ..RunSummary::default()
    };

    for call_path in index.call_paths() {
        let ctx = match assembler
            .assemble(call_path)
            .with_context(|| format!("Failed to assemble context for {call_path}"))?
        {
            Assembly::Emit(ctx) => ctx,
            Assembly::Skip(reason) => {
                log_skip(call_path, reason);
                summary.skipped += 1;
                continue;
            }
        };

        let messages = build_messages(&ctx);
        let answer = ask_until_answered(
            service,
            &messages,
            cfg.reasoning.min_answer_chars,
            cfg.reasoning.max_attempts,
        )
        .with_context(|| format!("Reasoning request failed for {call_path}"))?;

        let result = CallPathResult {
            call_path: ctx.call_path.clone(),
            complexity: extract_complexity(&answer),
            answer,
            token_count: ctx.token_count,
            truncated: ctx.truncated,
            excluded: ctx.excluded_names(),
        };
        if result.complexity.is_none() {
            tracing::warn!(call_path, "answer has no <complexity> tag");
        }
        on_result(&result);
        summary.results.push(result);
    }

    Ok(summary)
}

use crate::config::{TokenCounterConfig, TokenCounterKind};
use anyhow::{bail, Context, Result};
use tiktoken_rs::CoreBPE;

/// Size gauge for the context budget. Only needs to be monotonic in the text.
pub trait TokenCounter {
    fn count(&self, text: &str) -> usize;
}

/// BPE token count under a named tiktoken encoding.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn new(encoding: &str) -> Result<Self> {
        let bpe = match encoding {
            "o200k_base" => tiktoken_rs::o200k_base(),
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => bail!("unknown token encoding: {other}"),
        }
        .with_context(|| format!("Failed to load token encoding {encoding}"))?;

        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Cheap estimate: bytes / `chars_per_token`, rounded up.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioCounter {
    pub chars_per_token: usize,
}

impl TokenCounter for CharRatioCounter {
    fn count(&self, text: &str) -> usize {
        estimate_tokens_from_bytes(text.len() as u64, self.chars_per_token)
    }
}

pub fn estimate_tokens_from_bytes(total_bytes: u64, chars_per_token: usize) -> usize {
    if chars_per_token == 0 {
        return total_bytes as usize;
    }

    ((total_bytes as f64) / (chars_per_token as f64)).ceil() as usize
}

pub fn counter_from_config(cfg: &TokenCounterConfig) -> Result<Box<dyn TokenCounter>> {
    Ok(match cfg.kind {
        TokenCounterKind::Tiktoken => Box::new(TiktokenCounter::new(&cfg.encoding)?),
        TokenCounterKind::CharRatio => Box::new(CharRatioCounter {
            chars_per_token: cfg.chars_per_token,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_ratio_rounds_up() {
        let c = CharRatioCounter { chars_per_token: 4 };
        assert_eq!(c.count(""), 0);
        assert_eq!(c.count("abcd"), 1);
        assert_eq!(c.count("abcde"), 2);
    }

    #[test]
    fn zero_ratio_counts_bytes() {
        assert_eq!(estimate_tokens_from_bytes(11, 0), 11);
    }

    #[test]
    fn tiktoken_is_monotonic_under_append() {
        let c = TiktokenCounter::new("o200k_base").unwrap();
        let short = "for (int i = 0; i < n; ++i) {";
        let long = format!("{short}\n    for (int j = 0; j < n; ++j) sum += a[i][j];\n}}");
        assert!(c.count(short) > 0);
        assert!(c.count(&long) > c.count(short));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        assert!(TiktokenCounter::new("gpt2-ish").is_err());
    }
}

use symbolic_common::Name;
use symbolic_demangle::{Demangle, DemangleOptions};

/// Separator between frames of a call-path string.
pub const CALL_PATH_SEPARATOR: &str = "->";

/// What a literal `->` inside a symbol becomes, so it cannot be mistaken for a
/// frame boundary (e.g. `operator->`).
const SEPARATOR_ESCAPE: &str = "- >";

/// Turns raw region names into the labels used in call paths.
///
/// Implementations never fail; a symbol that cannot be cleaned up is returned
/// as-is (after separator escaping).
pub trait SymbolNormalizer {
    fn normalize(&self, raw: &str) -> String;
}

/// Best-effort Itanium C++ / Rust demangling.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemanglingNormalizer;

impl SymbolNormalizer for DemanglingNormalizer {
    fn normalize(&self, raw: &str) -> String {
        let name = Name::from(raw);
        let display = match name.demangle(DemangleOptions::complete()) {
            Some(demangled) if !demangled.is_empty() => demangled,
            _ => raw.to_string(),
        };
        escape_separator(&display)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughNormalizer;

impl SymbolNormalizer for PassthroughNormalizer {
    fn normalize(&self, raw: &str) -> String {
        escape_separator(raw)
    }
}

pub fn normalizer_for(demangle: bool) -> Box<dyn SymbolNormalizer> {
    if demangle {
        Box::new(DemanglingNormalizer)
    } else {
        Box::new(PassthroughNormalizer)
    }
}

fn escape_separator(name: &str) -> String {
    name.replace(CALL_PATH_SEPARATOR, SEPARATOR_ESCAPE)
}

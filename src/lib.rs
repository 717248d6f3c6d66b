pub mod config;
pub mod error;
pub mod profile;
pub mod symbols;
pub mod callpath;
pub mod locator;
pub mod extractor;
pub mod tokens;
pub mod assembler;
pub mod prompt;
pub mod reasoning;
pub mod pipeline;
pub mod xml_builder;

#![warn(clippy::all, clippy::pedantic)]
//! This crate compiles declarative production-rule documents into relational
//! database schemas implementing a forward-chaining inference engine.
//!
//! Rule modules declare facts, tunable parameters, constants, external
//! functions and rules; the compiler validates the documents, type-checks
//! and constant-folds every expression, analyses the rules into a typed IR,
//! rejects dependency cycles, and lowers the result to a SQL script of
//! tables, triggers, views and indexes. Loading that script into a database
//! engine yields the running inference engine; nothing here executes SQL.

use std::path::Path;

use thiserror::Error;

pub mod document;
pub mod engine;
pub mod expr;
pub mod ident;
pub mod loader;
pub mod schema;
pub mod sqlite;
pub mod validate;

/// Knobs for one compilation.
#[derive(Clone, Debug)]
pub struct Options {
    /// Prefix for every generated database object.
    pub prefix: String,
    /// Whether the `~` and `!~` operators are allowed in expressions.
    pub allow_regexp: bool,
    /// Whether rule-dependency cycles are a compile error.
    pub check_cycles: bool,
    /// The compile time written into the schema header. Passed in rather
    /// than read from a clock so that emission stays deterministic.
    pub timestamp: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            prefix: "sequent".to_owned(),
            allow_regexp: false,
            check_cycles: true,
            timestamp: String::new(),
        }
    }
}

/// A failed compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The rule documents could not be loaded or validated.
    #[error("Could not load rule file: {0}")]
    Load(#[from] loader::LoadError),
    /// Rule analysis reported errors; each one has already been logged.
    #[error(transparent)]
    Analysis(#[from] engine::analyzer::AnalysisErrors),
}

/// Compile in-memory rule modules to a schema.
///
/// Each source is a `(name, text)` pair; the names only appear in the
/// schema header.
///
/// # Errors
/// See [`CompileError`].
pub fn compile(sources: &[(&str, &str)], options: &Options) -> Result<String, CompileError> {
    let mut modules = Vec::with_capacity(sources.len());
    for (_, text) in sources {
        modules.push(loader::load_str(text)?);
    }
    let document = loader::merge(&modules)?;

    let mut analysis =
        engine::analyzer::analyze(&document, options.allow_regexp, options.check_cycles)?;

    let names: Vec<&str> = sources.iter().map(|(name, _)| *name).collect();
    Ok(sqlite::emit::generate(
        &options.prefix,
        &names.join(","),
        &options.timestamp,
        &mut analysis,
    ))
}

/// Compile rule modules from disk to a schema.
///
/// # Errors
/// See [`CompileError`].
pub fn compile_files(
    paths: &[impl AsRef<Path>],
    options: &Options,
) -> Result<String, CompileError> {
    let document = loader::load_files(paths)?;

    let mut analysis =
        engine::analyzer::analyze(&document, options.allow_regexp, options.check_cycles)?;

    let names: Vec<String> = paths
        .iter()
        .map(|path| path.as_ref().display().to_string())
        .collect();
    Ok(sqlite::emit::generate(
        &options.prefix,
        &names.join(","),
        &options.timestamp,
        &mut analysis,
    ))
}

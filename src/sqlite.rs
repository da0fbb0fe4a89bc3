//! The SQLite backend.
//!
//! [`lower`] turns analysed expressions into SQL fragments and tracks the
//! index demands they imply; [`emit`] renders the complete schema text. All
//! backend state (object prefix, once-domains, index-demand trees) lives in
//! a [`lower::Lowerer`] built fresh for each compilation.

pub mod emit;
pub mod lower;

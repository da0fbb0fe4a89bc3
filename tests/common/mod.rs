use sequent::{compile, CompileError, Options};

/// Options every scenario shares: a fixed prefix and timestamp so output is
/// reproducible, regexp operators enabled.
#[must_use]
pub fn options() -> Options {
    Options {
        prefix: "test".to_owned(),
        allow_regexp: true,
        check_cycles: true,
        timestamp: "0 (test)".to_owned(),
    }
}

/// Compile a single in-memory rule module with the shared options.
pub fn compile_module(text: &str) -> Result<String, CompileError> {
    compile(&[("module.yml", text)], &options())
}

/// The number of analysis errors a compilation failed with.
#[track_caller]
pub fn analysis_errors(result: Result<String, CompileError>) -> usize {
    match result {
        Err(CompileError::Analysis(failure)) => failure.count,
        Err(other) => panic!("expected analysis errors, got: {other}"),
        Ok(_) => panic!("expected analysis errors, compilation succeeded"),
    }
}

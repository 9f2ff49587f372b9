//! least Compiler Library
//!
//! Compiles `.least` source files to x86-64 ELF relocatable objects and
//! links them against the runtime support library (`uprint`, `putchar`).
//!
//! The pipeline is strictly linear: source text -> tokens -> AST ->
//! semantic checks -> instructions -> object bytes. Every stage error is
//! fatal and reported against the original source line; no partial
//! output survives a failure.
//!
//! ```rust,ignore
//! use lcc::{compile_file, CompilerConfig};
//!
//! let config = CompilerConfig::new();
//! compile_file(Path::new("demos/fib.least"), &config)?;
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod dictionary;
pub mod lexer;
pub mod parser;
pub mod semantics;

pub use config::CompilerConfig;
pub use context::CompileInfo;
pub use diagnostics::CompileError;

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

/// Compile source text to object-file bytes. `filename` labels
/// diagnostics and the ELF file symbol; nothing is read from disk.
pub fn compile_to_object(source: &str, filename: &str) -> Result<Vec<u8>, CompileError> {
    let mut c_info = CompileInfo::new(filename);

    debug!(file = filename, "lexing");
    let tokens = lexer::lex(source, &mut c_info)?;

    debug!(tokens = tokens.len(), "parsing");
    let root = parser::gen_ast(&tokens, &mut c_info)?;

    debug!("semantic analysis");
    semantics::semantic_analysis(&root, &mut c_info)?;

    debug!("lowering to instructions");
    let instructions = codegen::gen_instructions(&root, &mut c_info)?;

    let text = instructions.encode(&c_info.err)?;
    debug!(
        text_bytes = text.bytes.len(),
        relas = text.relas.len(),
        strings = c_info.known_strings.len(),
        "writing object"
    );

    codegen::elf::generate(&text, &c_info)
}

/// A fatal driver error outside any source line (I/O and the like),
/// formatted like every other diagnostic.
fn driver_error(file: &str, message: String) -> String {
    CompileError {
        file: file.to_string(),
        line: None,
        message,
    }
    .to_string()
}

/// Compile a source file to an executable: emit the object, link it
/// with `ld` against the runtime archive, and optionally run the
/// result, propagating the program's exit status.
pub fn compile_file(source_path: &Path, config: &CompilerConfig) -> Result<(), String> {
    let filename = source_path.display().to_string();
    let source = fs::read_to_string(source_path)
        .map_err(|e| driver_error(&filename, format!("Failed to read source file: {}", e)))?;

    info!(file = %filename, "compiling");
    let object = compile_to_object(&source, &filename).map_err(|e| e.to_string())?;

    let exe_path = match &config.output {
        Some(path) => path.clone(),
        None => source_path.with_extension(""),
    };
    let object_path = exe_path.with_extension("o");

    fs::write(&object_path, &object).map_err(|e| {
        driver_error(
            &filename,
            format!("Failed to write object file '{}': {}", object_path.display(), e),
        )
    })?;

    link_object(&object_path, &exe_path, &config.runtime_lib)?;

    if !config.keep_object {
        fs::remove_file(&object_path).ok();
    }

    if config.run_after_link {
        run_executable(&exe_path)?;
    }

    Ok(())
}

fn link_object(object: &Path, output: &Path, runtime_lib: &Path) -> Result<(), String> {
    let mut ld = Command::new("ld");
    ld.arg("-o").arg(output).arg(object).arg(runtime_lib);

    debug!(command = ?ld, "linking");
    let out = ld
        .output()
        .map_err(|e| format!("Failed to run ld: {}", e))?;

    if !out.status.success() {
        return Err(format!(
            "Linking failed:\n{}",
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(())
}

/// Run the linked executable. A nonzero exit of the program fails the
/// driver, so `lcc -r` reflects the run's status in its own exit code.
fn run_executable(path: &Path) -> Result<(), String> {
    let absolute = path
        .canonicalize()
        .map_err(|e| format!("Failed to locate '{}': {}", path.display(), e))?;

    let status = Command::new(&absolute)
        .status()
        .map_err(|e| format!("Failed to run '{}': {}", path.display(), e))?;

    info!(code = ?status.code(), "program finished");
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(format!("'{}' exited with code {}", path.display(), code)),
        None => Err(format!("'{}' was terminated by a signal", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_produces_an_elf_object() {
        let object = compile_to_object("exit 0", "smoke.least").unwrap();
        assert_eq!(&object[0..4], b"\x7fELF");
    }

    #[test]
    fn test_pipeline_reports_source_position() {
        let err = compile_to_object("int a 1\nexit b", "smoke.least").unwrap_err();
        assert_eq!(err.line, Some(1));
        assert!(err.to_string().starts_with("Compiler Error! smoke.least:2"));
    }

    #[test]
    fn test_io_errors_use_the_diagnostic_format() {
        let config = CompilerConfig::new();
        let err = compile_file(Path::new("no/such/file.least"), &config).unwrap_err();
        assert!(err.starts_with("Compiler Error! no/such/file.least:"));
        assert!(err.contains("Failed to read source file"));
    }
}

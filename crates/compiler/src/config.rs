//! Compiler configuration.
//!
//! Options the driver passes down to [`compile_file`](crate::compile_file).
//! Kept as a plain struct so library users (and tests) can build one
//! without going through the CLI.

use std::path::PathBuf;

/// Archive the linker resolves `uprint`/`putchar` from when nothing else
/// is configured.
pub const DEFAULT_RUNTIME_LIB: &str = "lib/libstdleast.a";

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Executable path; defaults to the source file without its extension.
    pub output: Option<PathBuf>,
    /// Run the linked executable after a successful build.
    pub run_after_link: bool,
    /// Keep the intermediate `.o` file next to the executable.
    pub keep_object: bool,
    /// Runtime support archive handed to the linker.
    pub runtime_lib: PathBuf,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            output: None,
            run_after_link: false,
            keep_object: false,
            runtime_lib: PathBuf::from(DEFAULT_RUNTIME_LIB),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_runtime_lib(mut self, path: PathBuf) -> Self {
        self.runtime_lib = path;
        self
    }
}

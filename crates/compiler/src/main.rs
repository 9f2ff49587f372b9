//! least Compiler CLI
//!
//! Command-line driver: `lcc [-r] FILE` compiles a `.least` program to
//! an executable next to it, exiting 1 on any compile or driver error.

use std::io;
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};

use lcc::CompilerConfig;

#[derive(Parser)]
#[command(name = "lcc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Least Complicated Compiler - compile .least programs to executables", long_about = None)]
struct Cli {
    /// Input .least source file
    #[arg(required_unless_present = "completions")]
    input: Option<PathBuf>,

    /// Run the program after compilation
    #[arg(short, long)]
    run: bool,

    /// Output executable path (defaults to the input filename without
    /// its extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep the intermediate object file
    #[arg(long)]
    keep_obj: bool,

    /// Runtime support archive handed to the linker
    #[arg(long, value_name = "PATH")]
    runtime: Option<PathBuf>,

    /// Generate shell completion scripts and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut io::stdout());
        return;
    }

    let input = cli.input.expect("clap requires the input argument");

    let mut config = CompilerConfig::new();
    config.output = cli.output;
    config.run_after_link = cli.run;
    config.keep_object = cli.keep_obj;
    if let Some(runtime) = cli.runtime {
        config.runtime_lib = runtime;
    }

    if let Err(message) = lcc::compile_file(&input, &config) {
        eprintln!("{}", message);
        process::exit(1);
    }
}

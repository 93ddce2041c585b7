use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use isngen::diagnostic::{Diagnostic, ansi::AnsiRenderer, json, registry};
use isngen::{CompileType, disasm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Listing,
    Json,
}

/// Generate VM instructions from a generator script.
#[derive(Debug, Parser)]
#[command(name = "isngen", version)]
struct Cli {
    /// Script to compile
    #[arg(required_unless_present = "explain")]
    script: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "listing")]
    emit: Emit,

    /// Variant of the functions to generate
    #[arg(long, value_enum, default_value = "normal")]
    compile_type: CompileType,

    /// Report errors as JSON on stderr
    #[arg(long)]
    json_errors: bool,

    /// Never colour error output
    #[arg(long)]
    no_color: bool,

    /// More logging on stderr, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Explain an error code, e.g. ISN-T001
    #[arg(long, value_name = "CODE")]
    explain: Option<String>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "isngen=debug",
        _ => "isngen=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn report(cli: &Cli, d: &Diagnostic) {
    if cli.json_errors {
        eprintln!("{}", json::render(d));
    } else {
        let use_color = !cli.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
        eprint!("{}", AnsiRenderer { use_color }.render(d));
    }
}

fn explain(code: &str) -> ExitCode {
    match registry::lookup(code) {
        Some(entry) => {
            print!("{}", entry.long);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("unknown error code: {code}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(code) = &cli.explain {
        return explain(code);
    }
    let Some(path) = &cli.script else {
        return ExitCode::FAILURE;
    };

    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            report(&cli, &Diagnostic::error(format!("cannot read {}: {e}", path.display())));
            return ExitCode::FAILURE;
        }
    };

    let funcs = match isngen::run(&source, cli.compile_type) {
        Ok(funcs) => funcs,
        Err(e) => {
            report(&cli, &Diagnostic::from(&e).with_source(source));
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(count = funcs.len(), "generated");

    match cli.emit {
        Emit::Listing => print!("{}", disasm::listing(&funcs)),
        Emit::Json => match serde_json::to_string_pretty(&funcs) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                report(&cli, &Diagnostic::error(format!("serialization error: {e}")));
                return ExitCode::FAILURE;
            }
        },
    }
    ExitCode::SUCCESS
}

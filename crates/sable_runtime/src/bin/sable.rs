//! Sable CLI entry point.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use sable_runtime::Repl;

/// CLI configuration parsed from arguments.
#[derive(Default)]
struct CliConfig {
    files: Vec<PathBuf>,
    expressions: Vec<String>,
    batch_mode: bool,
    disasm: bool,
    show_help: bool,
    show_version: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError: {e}\x1b[0m");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<CliConfig, Box<dyn std::error::Error>> {
    let mut config = CliConfig::default();
    let mut args = args.into_iter().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => config.show_help = true,
            "-V" | "--version" => config.show_version = true,
            "-b" | "--batch" => config.batch_mode = true,
            "-d" | "--disasm" => config.disasm = true,
            "-e" | "--eval" => {
                let expression = args.next().ok_or("--eval requires an expression")?;
                config.expressions.push(expression);
                config.batch_mode = true;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("unknown option: {arg}").into());
            }
            path => config.files.push(PathBuf::from(path)),
        }
    }

    Ok(config)
}

fn run(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args(args)?;

    if config.show_help {
        print_help();
        return Ok(());
    }

    if config.show_version {
        println!("sable {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut repl = Repl::new()?.with_disasm(config.disasm);

    for file in &config.files {
        repl.eval_file(file)?;
    }

    for expression in &config.expressions {
        println!("{}", repl.eval(expression)?);
    }

    if config.batch_mode {
        return Ok(());
    }

    if !config.files.is_empty() {
        repl = repl.without_banner();
    }

    repl.run()?;
    Ok(())
}

fn print_help() {
    println!(
        "\x1b[1mSable\x1b[0m - A small Lisp with a register-based bytecode compiler

\x1b[1mUSAGE:\x1b[0m
    sable [OPTIONS] [FILES...]

\x1b[1mARGUMENTS:\x1b[0m
    [FILES...]    Files to run before starting the REPL

\x1b[1mOPTIONS:\x1b[0m
    -h, --help         Print help information
    -V, --version      Print version information
    -b, --batch        Run files and exit (no REPL)
    -e, --eval EXPR    Evaluate EXPR, print the result, and exit
    -d, --disasm       Print the bytecode listing of each compiled form

\x1b[1mEXAMPLES:\x1b[0m
    sable                        Start interactive REPL
    sable lib.sbl                Run lib.sbl, then start REPL
    sable -b script.sbl          Run script.sbl and exit
    sable -d -e '(+ 1 2)'        Show the bytecode for one expression

Set RUST_LOG=debug to see compiler and VM logging."
    );
}

use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info};

use millie::diagnostics::{Diagnostics, Renderer};
use millie::{compiler, format, vm};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Millie source file to run.
    input: std::path::PathBuf,

    /// Print the inferred type instead of running the program.
    #[arg(short = 't', long = "print-type")]
    print_type: bool,

    /// Log allocation and symbol-table statistics after running.
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn run() -> i32 {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            err.print().ok();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => -1,
            };
        }
    };

    let log_level = if args.verbose { log::Level::Info } else { log::Level::Warn };
    simple_logger::init_with_level(log_level).unwrap();

    let source = match std::fs::read_to_string(&args.input) {
        Ok(source) => source,
        Err(err) => {
            error!("could not read '{}': {err}", args.input.display());
            return -1;
        }
    };

    let mut diagnostics = Diagnostics::new();
    let checked = millie::type_check(&source, &mut diagnostics);

    if diagnostics.has_errors() {
        let renderer = Renderer {
            path: &args.input.to_string_lossy(),
            source: &source,
        };
        eprintln!("{}", renderer.render_all(&diagnostics));
        return 1;
    }

    if args.print_type {
        println!("{}", format::format_type(&checked.arena, checked.ty));
        return 0;
    }

    let module = compiler::compile(&checked.expr, &checked.tokens, &mut diagnostics);
    if diagnostics.has_errors() {
        let renderer = Renderer {
            path: &args.input.to_string_lossy(),
            source: &source,
        };
        eprintln!("{}", renderer.render_all(&diagnostics));
        return 1;
    }

    let mut runner = vm::Vm::new(&module);
    let result = runner.call(0, 0, 0);
    println!("{}", format::format_value(&checked.arena, checked.ty, result, &runner));

    if args.verbose {
        info!(
            "{} allocations, {} interned symbols",
            runner.allocations(),
            checked.symbols.len()
        );
    }

    0
}

fn main() {
    std::process::exit(run());
}

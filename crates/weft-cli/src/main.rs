use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use weft_cli::{format_diagnostics, render, run_order, run_weave, OutputFormat};
use weft_core::init_tracing;

fn cli() -> Command {
    Command::new("weft")
        .version(weft_core::VERSION)
        .about("Deterministic transformation weaver")
        .subcommand_required(true)
        .subcommand(
            Command::new("weave")
                .about("Weave transformations into a program and print the result")
                .arg(
                    Arg::new("input")
                        .value_name("INPUT")
                        .help("Weave input JSON file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("FILE")
                        .help("Weave configuration JSON file"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_name("FORMAT")
                        .help("Output format: source or json")
                        .default_value("source"),
                )
                .arg(
                    Arg::new("debug")
                        .long("debug")
                        .help("Enable debug logging")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("order")
                .about("Print the weave order and initialization order")
                .arg(
                    Arg::new("input")
                        .value_name("INPUT")
                        .help("Weave input JSON file")
                        .required(true)
                        .index(1),
                ),
        )
}

fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("weave", args)) => {
            if args.get_flag("debug") && std::env::var_os("RUST_LOG").is_none() {
                std::env::set_var("RUST_LOG", "weft_core=debug,weft_cli=debug");
            }
            init_tracing();

            let input = args
                .get_one::<String>("input")
                .map(PathBuf::from)
                .unwrap_or_default();
            let config = args.get_one::<String>("config").map(PathBuf::from);
            let format: OutputFormat = args
                .get_one::<String>("format")
                .map(|f| f.parse())
                .transpose()?
                .unwrap_or_default();

            let result = run_weave(&input, config.as_deref())?;
            eprint!("{}", format_diagnostics(&result)?);
            println!("{}", render(&result, format)?);
            if result.has_errors() {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(("order", args)) => {
            init_tracing();
            let input = args
                .get_one::<String>("input")
                .map(PathBuf::from)
                .unwrap_or_default();
            print!("{}", run_order(&input)?);
            Ok(ExitCode::SUCCESS)
        }
        _ => Ok(ExitCode::FAILURE),
    }
}

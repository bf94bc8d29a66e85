//! CLI probe for `cellcut_core`.
//!
//! # Responsibility
//! - Print the linked core version.
//! - Validate a filter expression against a column list without loading data.

use cellcut_core::{dependencies, parse, CellTable, CoreConfig, ExprError};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::Path;
use std::process;

fn build_cli() -> Command {
    Command::new("cellcut")
        .about("Cell selection and sorting-protocol toolkit")
        .version(cellcut_core::core_version())
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("TOML config file; enables file logging when [logging] sets a directory"),
        )
        .subcommand(Command::new("version").about("Print the core version"))
        .subcommand(
            Command::new("check")
                .about("Parse an expression and resolve its columns")
                .arg(Arg::new("expression").required(true))
                .arg(
                    Arg::new("columns")
                        .num_args(0..)
                        .action(ArgAction::Append)
                        .help("Available column names"),
                ),
        )
}

fn main() {
    let matches = build_cli().get_matches();

    if let Some(path) = matches.get_one::<String>("config") {
        if let Err(message) = load_config(Path::new(path)) {
            eprintln!("{message}");
            process::exit(2);
        }
    }

    let exit_code = match matches.subcommand() {
        Some(("check", sub)) => run_check(sub),
        _ => {
            println!("cellcut_core version={}", cellcut_core::core_version());
            0
        }
    };
    process::exit(exit_code);
}

fn load_config(path: &Path) -> Result<CoreConfig, String> {
    let config = CoreConfig::load(path).map_err(|err| err.to_string())?;
    cellcut_core::init_from_config(&config.logging)?;
    Ok(config)
}

fn run_check(matches: &ArgMatches) -> i32 {
    let Some(expression) = matches.get_one::<String>("expression") else {
        return 2;
    };
    let mut schema = CellTable::new(Vec::new());
    for column in matches.get_many::<String>("columns").into_iter().flatten() {
        if let Err(err) = schema.insert_column(column.as_str(), Vec::new()) {
            eprintln!("{err}");
            return 2;
        }
    }

    let result = parse(expression).and_then(|parsed| dependencies(&parsed, &schema));
    match result {
        Ok(columns) => {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            println!("ok columns=[{}]", columns.join(", "));
            0
        }
        Err(err) => {
            report(expression, &err);
            1
        }
    }
}

fn report(expression: &str, err: &ExprError) {
    eprintln!("error: {err}");
    if let Some(position) = err.position() {
        eprintln!("  {expression}");
        let offset: String = expression
            .chars()
            .take(position)
            .map(|ch| if ch == '\t' { '\t' } else { ' ' })
            .collect();
        eprintln!("  {offset}^");
    }
}

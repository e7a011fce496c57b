// Run the dataflow analyses over an instruction stream and print their
// gen/kill/in/out tables.

use std::process::exit;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use ucopt::commons::init_logger;
use ucopt::middle_end::analysis::*;
use ucopt::middle_end::cfg::Cfg;
use ucopt::middle_end::ir::Program;

#[derive(Clone, Copy, ValueEnum)]
enum Analysis {
    ReachingDefs,
    AvailableExprs,
    Liveness,
    AvailableCopies,
    All,
}

// Command-line arguments
#[derive(Parser)]
#[command(version, about)]
struct Args {
    analysis: Analysis,
    /// An `.ir` text file or a `.json` tuple file.
    input_file: String,
    /// Defaults to standard output.
    output_file: Option<String>,
    /// Print the tables as JSON.
    #[arg(long)]
    json: bool,
}

fn render<T: Serialize + std::fmt::Display>(results: &[T], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(results)?);
    }
    Ok(results
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n"))
}

fn run_analysis(analysis: Analysis, cfg: &Cfg, json: bool) -> Result<String> {
    fn each<F: Ord + std::fmt::Display + Serialize>(
        cfg: &Cfg,
        json: bool,
        analyze: fn(&ucopt::middle_end::cfg::Function) -> Results<F>,
    ) -> Result<String> {
        let results = cfg.functions.iter().map(analyze).collect::<Vec<_>>();
        render(&results, json)
    }

    match analysis {
        Analysis::ReachingDefs => each(cfg, json, reaching_defs::analyze),
        Analysis::AvailableExprs => each(cfg, json, available_exprs::analyze),
        Analysis::Liveness => each(cfg, json, liveness::analyze),
        Analysis::AvailableCopies => each(cfg, json, available_copies::analyze),
        Analysis::All => render(&run_all(cfg), json),
    }
}

fn wrapped_main(args: Args) -> Result<()> {
    let input_file = args.input_file.as_str();
    let input_string = std::fs::read_to_string(input_file)
        .with_context(|| format!("could not read the input file {input_file}"))?;

    let program = if input_file.ends_with(".json") {
        Program::from_json(&input_string)?
    } else {
        input_string.parse::<Program>()?
    };
    let cfg = Cfg::build(&program.validate()?)?;

    let output = run_analysis(args.analysis, &cfg, args.json)?;

    match args.output_file {
        Some(output_file) => std::fs::write(&output_file, output)
            .with_context(|| format!("failed to write the output file {output_file}")),
        None => {
            println!("{output}");
            Ok(())
        }
    }
}

pub fn main() {
    let args = Args::parse();
    init_logger();

    if let Err(err) = wrapped_main(args) {
        for cause in err.chain() {
            eprintln!("error: {cause}");
        }
        exit(1);
    }
}

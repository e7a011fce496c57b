// The optimizer driver: read an instruction stream, run the requested passes
// and write the result as IR text, JSON tuples or a graphviz drawing.

use std::process::exit;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use derive_more::Display;
use ucopt::commons::{init_logger, InternalError, Valid};
use ucopt::middle_end::cfg::cfg_dump_impl::dump_cfg_of_whole_program;
use ucopt::middle_end::cfg::Cfg;
use ucopt::middle_end::ir::Program;
use ucopt::middle_end::optimization::copy_prop::copy_prop_program;

// Input/output file types
#[derive(Display, Clone, Copy, PartialEq, Eq)]
enum FileType {
    Ir,
    Json,
    Dot,
}

// File names with associated file types.  This is used for determining input
// and output file types from file names.
#[derive(Clone)]
struct File {
    typ: FileType,
    name: String,
}

impl FromStr for File {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use FileType::*;

        let name = String::from(s);
        let typ = s
            .rsplit_once('.')
            .and_then(|(_, extension)| match extension {
                "ir" => Some(Ir),
                "json" => Some(Json),
                "dot" => Some(Dot),
                _ => None,
            })
            .ok_or_else(|| {
                format!("Expected a file name with one of the following extensions: ir, json, dot. Got {s}")
            })?;

        Ok(File { typ, name })
    }
}

#[derive(Clone)]
struct Pass(fn(Valid<Program>) -> Result<Valid<Program>, InternalError>);

impl FromStr for Pass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "copy-prop" => Ok(Pass(copy_prop_program)),
            _ => Err(format!("unknown optimization pass: {s}")),
        }
    }
}

// Command-line arguments
#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[arg(short = 'O', long)]
    optimization_passes: Vec<Pass>,
    input_file: File,
    output_file: File,
}

fn wrapped_main(args: Args) -> Result<()> {
    let input_file = args.input_file.name.as_str();
    let output_file = args.output_file.name.as_str();

    let input_string = std::fs::read_to_string(input_file)
        .with_context(|| format!("could not read the input file {input_file}"))?;

    let program: Program = match args.input_file.typ {
        FileType::Ir => input_string.parse()?,
        FileType::Json => Program::from_json(&input_string)?,
        FileType::Dot => bail!("the input file cannot be a graph description"),
    };

    let mut program = program.validate()?;

    for pass in args.optimization_passes {
        program = (pass.0)(program)?;
    }

    let output = match args.output_file.typ {
        FileType::Ir => program.0.to_string(),
        FileType::Json => program.0.to_json()?,
        FileType::Dot => dump_cfg_of_whole_program(&Cfg::build(&program)?),
    };

    std::fs::write(output_file, output)
        .with_context(|| format!("failed to write the output file {output_file}"))
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

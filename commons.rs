//! Things shared by every stage of the optimizer.

use derive_more::Display;

/// A value that passed validation.  Only `validate` functions and
/// `skip_validation` construct these, so holding one is proof that the
/// checks ran.
#[derive(Clone, Debug, PartialEq)]
pub struct Valid<T>(pub T);

/// Wrap a value without checking it.  Tests use this to feed deliberately
/// malformed programs to the later stages.
pub fn skip_validation<T>(t: T) -> Valid<T> {
    Valid(t)
}

/// A broken optimizer invariant.  These are bugs in the lowering stage or in
/// the optimizer itself, never errors in the user's source program.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum InternalError {
    #[display(fmt = "function `{}`: label `{}` is never defined", func, label)]
    UnresolvedLabel { func: String, label: String },
    #[display(fmt = "function `{}`: label `{}` is defined twice", func, label)]
    DuplicateLabel { func: String, label: String },
    #[display(fmt = "instruction `{}` appears outside of any function", _0)]
    OutsideFunction(String),
    #[display(fmt = "optimized program failed validation: {}", _0)]
    Revalidation(String),
}

impl std::error::Error for InternalError {}

/// Set up logging for the command-line tools.  Logging is off unless the
/// `UCOPT_LOG` environment variable asks for it, e.g. `UCOPT_LOG=debug` or
/// `UCOPT_LOG=ucopt::middle_end::analysis=trace`.
pub fn init_logger() {
    let env = env_logger::Env::default()
        .filter("UCOPT_LOG")
        .write_style("UCOPT_LOG_STYLE");
    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Off)
        .parse_env(env)
        .init();
}

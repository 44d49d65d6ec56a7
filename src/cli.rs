use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::segment::Mode;

#[derive(Parser, Debug, Clone)]
#[command(name = "pylive", about = "Live inline evaluation for Python source", version)]
#[command(group(ArgGroup::new("output").args(["json", "gil_status"]).multiple(false)))]
pub struct Cli {
    /// Python file to evaluate. Reads stdin when omitted.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Which lines get annotated (explicit|auto).
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Marker substring flagging a line for annotation.
    /// Can be used multiple times: --marker "# ?" --marker "# =>"
    #[arg(long = "marker", action = clap::ArgAction::Append)]
    pub markers: Vec<String>,

    /// Pause between units, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub delay: Option<u64>,

    /// Per-unit evaluation timeout, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Quiet period after a change before re-evaluating (with --watch).
    #[arg(long, value_name = "MS")]
    pub debounce: Option<u64>,

    /// Python interpreter to run units with.
    #[arg(long, value_name = "PATH")]
    pub python: Option<String>,

    /// Re-evaluate FILE whenever it changes, until Ctrl-C.
    #[arg(short = 'w', long, requires = "file")]
    pub watch: bool,

    /// Print annotations as a JSON array instead of an annotated listing.
    #[arg(long)]
    pub json: bool,

    /// Append each unit's evaluation time.
    #[arg(long)]
    pub timings: bool,

    /// Do not show progress while units run.
    #[arg(long = "no-waiting")]
    pub no_waiting: bool,

    /// Report the interpreter version and whether its GIL is enabled, then exit.
    #[arg(long = "gil-status")]
    pub gil_status: bool,

    /// Verbose logging to stderr.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

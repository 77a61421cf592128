use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, CommandFactory, Parser};

/// Watch directories and restart a command whenever a file in them changes.
///
/// gomon runs the command in its own process group. On every write or rename
/// inside a watched directory the whole group is killed and the command is
/// started again.
#[derive(Parser, Debug)]
#[command(name = "gomon", version, about, long_about = None)]
pub struct Cli {
    /// Directories to watch. The first one is also searched for .go files when
    /// no command is given.
    #[arg(value_name = "DIRECTORY")]
    pub directories: Vec<PathBuf>,

    /// Command to execute and restart. Defaults to "go run <first directory>/*.go".
    #[arg(long = "cmd", value_name = "COMMAND")]
    pub cmd: Option<String>,

    /// Watch the directories recursively (true or false). Defaults to true.
    #[arg(short = 'r', value_name = "BOOL", action = ArgAction::Set)]
    pub recursive: Option<bool>,

    /// Be quiet: informational output is suppressed, errors are still shown.
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Arguments appended to the command, given after `--`.
    #[arg(last = true, value_name = "ARGS")]
    pub command_args: Vec<String>,
}

/// Accept the single-dash `-cmd` spelling by rewriting it to `--cmd`.
///
/// Nothing after the `--` separator is touched: those arguments belong to the
/// managed command.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            if passthrough {
                return arg;
            }
            match arg.to_str() {
                Some("--") => {
                    passthrough = true;
                    arg
                }
                Some("-cmd") => OsString::from("--cmd"),
                Some(s) if s.starts_with("-cmd=") => OsString::from(format!("-{s}")),
                _ => arg,
            }
        })
        .collect()
}

/// Print usage text to stderr.
pub fn print_usage() {
    eprintln!("Usage of gomon:\n");
    eprintln!("  gomon directory [directory...]\n");
    eprintln!(
        "  The given directories will be watched. In case no '-cmd' is given, the .go files \
         in the first directory will be executed with 'go run'\n"
    );
    eprint!("{}", Cli::command().render_help());
}

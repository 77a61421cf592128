use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::ConfigError;

/// Name of the optional settings file, looked up in the first watched directory.
pub const CONFIG_FILE: &str = "gomon.toml";

/// Settings loaded from `gomon.toml`. Command-line flags take precedence.
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Command line to execute instead of `go run *.go`.
    pub cmd: Option<String>,
    /// Watch directories recursively.
    pub recursive: Option<bool>,
    /// Suppress informational output.
    pub quiet: Option<bool>,
}

impl FileConfig {
    /// Load `gomon.toml` from the given directory.
    ///
    /// Returns a default (empty) configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("warning: failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                eprintln!("warning: failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }
}

/// Fully resolved configuration. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub directories: Vec<PathBuf>,
    pub recursive: bool,
    /// Program to execute.
    pub command: String,
    /// Arguments from the command line string followed by passthrough arguments.
    pub command_args: Vec<String>,
    pub quiet: bool,
}

impl Config {
    /// Resolve the parsed command line, the settings file and the defaults.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let Some(first) = cli.directories.first() else {
            return Err(ConfigError::NoDirectories);
        };
        let file = FileConfig::load(first);

        let recursive = cli.recursive.or(file.recursive).unwrap_or(true);
        let quiet = cli.quiet || file.quiet.unwrap_or(false);

        let command_line = match cli.cmd.or(file.cmd).filter(|cmd| !cmd.is_empty()) {
            Some(cmd) => cmd,
            None => default_command(first)?,
        };
        let (command, mut command_args) = split_command(&command_line)?;
        command_args.extend(cli.command_args);

        Ok(Self {
            directories: cli.directories,
            recursive,
            command,
            command_args,
            quiet,
        })
    }
}

/// `go run` followed by every `.go` file directly inside `dir`, in name order.
pub fn default_command(dir: &Path) -> Result<String, ConfigError> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&escaped).join("*.go").to_string_lossy().into_owned();

    let paths = glob::glob(&pattern).map_err(|err| ConfigError::InvalidPattern {
        pattern: pattern.clone(),
        reason: err.to_string(),
    })?;
    let files: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|path| path.display().to_string())
        .collect();

    if files.is_empty() {
        return Err(ConfigError::NoSourceFiles {
            dir: dir.to_path_buf(),
        });
    }
    Ok(format!("go run {}", files.join(" ")))
}

/// Split a command line on whitespace into program and arguments.
// TODO: quoting, so paths containing spaces survive the split.
pub fn split_command(line: &str) -> Result<(String, Vec<String>), ConfigError> {
    let mut words = line.split_whitespace().map(str::to_string);
    let program = words.next().ok_or(ConfigError::EmptyCommand)?;
    Ok((program, words.collect()))
}

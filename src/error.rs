//! Error types for configuration, watching, and process supervision.

use std::path::PathBuf;

use thiserror::Error;

/// Problems with the user-supplied configuration. Always fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no directory to watch was given")]
    NoDirectories,

    #[error("no go files found in {}", dir.display())]
    NoSourceFiles { dir: PathBuf },

    #[error("invalid source file pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("the command to execute is empty")]
    EmptyCommand,
}

/// Errors from directory scanning and watch registration.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("error reading directory {}: {reason}", path.display())]
    DirectoryRead { path: PathBuf, reason: String },

    #[error("failed to initialize file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("cannot watch {}: {source}", path.display())]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Errors from launching, killing, or reaping the managed process.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to kill process group {pgid}: {source}")]
    Kill {
        pgid: i32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("supervisor is stopped")]
    Stopped,
}

/// Failure of the signal-driven shutdown path.
#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("signal source closed before the managed process was killed")]
    SignalsClosed,

    #[error("giving up after {attempts} failed kill attempts: {last}")]
    KillFailed { attempts: usize, last: ProcessError },
}

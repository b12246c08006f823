//! Immutable per-mode configuration handed to the core exactly once

use std::path::PathBuf;

/// Where the sender's framed stream goes.
#[derive(Debug, Clone)]
pub enum SinkSpec {
    /// Write the stream to a local file.
    File(PathBuf),
    /// Write the stream to standard output (for manual piping).
    Stdout,
    /// Spawn a local peer process and write into its standard input.
    Command { program: String, args: Vec<String> },
    /// Spawn the peer on a remote host via ssh.
    Remote { host: String, command: String },
}

/// Where the applier's framed stream comes from.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    File(PathBuf),
    Stdin,
}

#[derive(Debug, Clone)]
pub struct SendConfig {
    /// Origin block device (or its snapshot view).
    pub origin: PathBuf,
    /// Changed-range listing from the volume-management collaborator.
    pub ranges: SourceSpec,
    pub sink: SinkSpec,
    /// Suppress progress reporting.
    pub quiet: bool,
    /// Report transfer events on stderr.
    pub verbose: bool,
    /// Append transfer events to this file.
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ApplyConfig {
    /// Destination block device being brought up to date.
    pub destination: PathBuf,
    pub source: SourceSpec,
    /// Capture pre-overwrite bytes here before each write.
    pub snapback: Option<PathBuf>,
    /// Report skipped chunks and a completion summary on stderr.
    pub verbose: bool,
    /// Append transfer events to this file.
    pub log_file: Option<PathBuf>,
}

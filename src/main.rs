//! snapsync - replicate only the changed byte ranges of a block device
//!
//! Two modes, one wire format:
//! - `send` reads the changed ranges of an origin device and streams them as
//!   framed chunks to a file, stdout, or a (possibly remote) peer process;
//! - `apply` consumes such a stream and writes the chunks to a destination
//!   device, optionally capturing pre-overwrite bytes into a snapback log.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use snapsync::apply::apply_stream;
use snapsync::config::{ApplyConfig, SendConfig, SinkSpec, SourceSpec};
use snapsync::device::OriginDevice;
use snapsync::diff::{load_range_list, StaticDiffSource};
use snapsync::logger::{Logger, NoopLogger, StderrLogger, TextLogger};
use snapsync::progress::{NoopObserver, ThroughputReporter, TransferObserver};
use snapsync::send::send_diff;
use snapsync::transport::{ChannelSink, ChannelSource};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "snapsync - block device replication that transfers only changed ranges"
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Stream the origin's changed ranges as a framed diff
    Send {
        /// Origin block device (or its snapshot view)
        #[arg(long)]
        origin: PathBuf,

        /// Changed-range listing ("start length" per line), "-" for stdin
        #[arg(long)]
        ranges: PathBuf,

        /// Write the stream to a local file
        #[arg(long, conflicts_with_all = ["stdout", "dest"])]
        output: Option<PathBuf>,

        /// Write the stream to standard output
        #[arg(long, conflicts_with = "dest")]
        stdout: bool,

        /// Pipe the stream into `ssh HOST COMMAND` (format: HOST:COMMAND)
        #[arg(long)]
        dest: Option<String>,

        /// Suppress progress reporting
        #[arg(short, long)]
        quiet: bool,

        /// Report transfer events on stderr
        #[arg(short, long)]
        verbose: bool,

        /// Append transfer events to a log file
        #[arg(long = "log-file")]
        log_file: Option<PathBuf>,
    },
    /// Apply a framed diff stream to the destination device
    Apply {
        /// Destination block device
        #[arg(long)]
        dest: PathBuf,

        /// Read the stream from a file, "-" for stdin
        #[arg(long, default_value = "-")]
        input: PathBuf,

        /// Capture pre-overwrite bytes into this snapback log
        #[arg(long)]
        snapback: Option<PathBuf>,

        /// Report skipped chunks and transfer events on stderr
        #[arg(short, long)]
        verbose: bool,

        /// Append transfer events to a log file
        #[arg(long = "log-file")]
        log_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    match Cli::parse().command {
        Cmd::Send {
            origin,
            ranges,
            output,
            stdout,
            dest,
            quiet,
            verbose,
            log_file,
        } => {
            let sink = if let Some(path) = output {
                SinkSpec::File(path)
            } else if stdout {
                SinkSpec::Stdout
            } else if let Some(spec) = dest {
                let (host, command) = spec
                    .split_once(':')
                    .context("--dest expects HOST:COMMAND")?;
                SinkSpec::Remote {
                    host: host.to_string(),
                    command: command.to_string(),
                }
            } else {
                bail!("send needs one of --output, --stdout, or --dest");
            };
            let cfg = SendConfig {
                origin,
                ranges: source_spec(ranges),
                sink,
                quiet,
                verbose,
                log_file,
            };
            run_send(&cfg)
        }
        Cmd::Apply {
            dest,
            input,
            snapback,
            verbose,
            log_file,
        } => {
            let cfg = ApplyConfig {
                destination: dest,
                source: source_spec(input),
                snapback,
                verbose,
                log_file,
            };
            run_apply(&cfg)
        }
    }
}

fn source_spec(path: PathBuf) -> SourceSpec {
    if path.as_os_str() == "-" {
        SourceSpec::Stdin
    } else {
        SourceSpec::File(path)
    }
}

fn select_logger(log_file: Option<&Path>, verbose: bool) -> Result<Arc<dyn Logger>> {
    Ok(if let Some(path) = log_file {
        Arc::new(TextLogger::new(path)?)
    } else if verbose {
        Arc::new(StderrLogger)
    } else {
        Arc::new(NoopLogger)
    })
}

fn run_send(cfg: &SendConfig) -> Result<()> {
    let ranges = {
        let mut input = open_source(&cfg.ranges)?;
        load_range_list(&mut input).context("failed to parse range listing")?
    };
    let mut source = StaticDiffSource::new(ranges)?;

    // Open the origin before any channel byte is written: an unreadable
    // device must abort without emitting the handshake.
    let mut origin = OriginDevice::open(&cfg.origin)?;

    let mut sink = match &cfg.sink {
        SinkSpec::File(path) => ChannelSink::to_file(path)?,
        SinkSpec::Stdout => ChannelSink::to_stdout(),
        SinkSpec::Command { program, args } => ChannelSink::to_command(program, args)?,
        SinkSpec::Remote { host, command } => ChannelSink::to_remote(host, command)?,
    };

    let mut observer: Box<dyn TransferObserver> = if cfg.quiet {
        Box::new(NoopObserver)
    } else {
        Box::new(ThroughputReporter::new())
    };

    let logger = select_logger(cfg.log_file.as_deref(), cfg.verbose)?;
    logger.start("send", &cfg.origin);
    send_diff(
        &mut origin,
        &mut source,
        &mut sink,
        observer.as_mut(),
        logger.as_ref(),
    )?;
    sink.finish()
}

fn run_apply(cfg: &ApplyConfig) -> Result<()> {
    let logger = select_logger(cfg.log_file.as_deref(), cfg.verbose)?;

    let mut input = open_source(&cfg.source)?;
    let stats = apply_stream(
        &mut input,
        &cfg.destination,
        cfg.snapback.as_deref(),
        logger.as_ref(),
    )?;
    input.finish()?;

    if cfg.verbose {
        eprintln!(
            "applied {} chunks ({} bytes), skipped {} beyond destination size",
            stats.chunks_applied, stats.bytes_written, stats.chunks_skipped
        );
    }
    Ok(())
}

fn open_source(spec: &SourceSpec) -> Result<ChannelSource> {
    Ok(match spec {
        SourceSpec::File(path) => ChannelSource::from_file(path)?,
        SourceSpec::Stdin => ChannelSource::from_stdin(),
    })
}

//! Byte channels between sender and applier
//!
//! The transfer loops only need ordered, reliable, blocking Read/Write.
//! Everything about where the bytes actually go - a local file, a stdio
//! pipe, a spawned peer process, or a peer behind an ssh invocation - lives
//! behind these two types so the core never special-cases a transport.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Send-side channel: a buffered byte sink plus the peer process to reap.
pub struct ChannelSink {
    writer: Box<dyn Write>,
    child: Option<Child>,
}

impl ChannelSink {
    pub fn to_file(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create output file {}", path.display()))?;
        Ok(Self {
            writer: Box::new(BufWriter::new(file)),
            child: None,
        })
    }

    pub fn to_stdout() -> Self {
        Self {
            writer: Box::new(BufWriter::new(io::stdout())),
            child: None,
        }
    }

    /// Spawn a local peer and stream into its standard input.
    pub fn to_command(program: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn peer process {}", program))?;
        let stdin = child
            .stdin
            .take()
            .context("peer process has no standard input")?;
        Ok(Self {
            writer: Box::new(BufWriter::new(stdin)),
            child: Some(child),
        })
    }

    /// Spawn the peer on a remote host: `ssh HOST COMMAND`, stream into its
    /// standard input. The remote command is typically `snapsync apply ...`.
    pub fn to_remote(host: &str, command: &str) -> Result<Self> {
        let mut child = Command::new("ssh")
            .arg(host)
            .arg(command)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn ssh to {}", host))?;
        let stdin = child
            .stdin
            .take()
            .context("ssh process has no standard input")?;
        Ok(Self {
            writer: Box::new(BufWriter::new(stdin)),
            child: Some(child),
        })
    }

    /// Flush, close the peer's stdin, and reap it. A non-zero peer exit is
    /// surfaced here so a failed remote apply fails the whole transfer.
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().context("failed to flush output channel")?;
        drop(self.writer); // closes the pipe so the peer sees EOF
        if let Some(mut child) = self.child {
            let status = child.wait().context("failed to wait for peer process")?;
            if !status.success() {
                bail!("peer process exited with {}", status);
            }
        }
        Ok(())
    }
}

impl Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Apply-side channel: a buffered byte source plus the peer process to reap.
pub struct ChannelSource {
    reader: Box<dyn Read>,
    child: Option<Child>,
}

impl ChannelSource {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open input file {}", path.display()))?;
        Ok(Self {
            reader: Box::new(BufReader::new(file)),
            child: None,
        })
    }

    pub fn from_stdin() -> Self {
        Self {
            reader: Box::new(BufReader::new(io::stdin())),
            child: None,
        }
    }

    /// Spawn a local producer and read its standard output.
    pub fn from_command(program: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn peer process {}", program))?;
        let stdout = child
            .stdout
            .take()
            .context("peer process has no standard output")?;
        Ok(Self {
            reader: Box::new(BufReader::new(stdout)),
            child: Some(child),
        })
    }

    /// Spawn a remote producer (`ssh HOST COMMAND`) and read its output;
    /// this is the pull-mode counterpart of [`ChannelSink::to_remote`].
    pub fn from_remote(host: &str, command: &str) -> Result<Self> {
        let mut child = Command::new("ssh")
            .arg(host)
            .arg(command)
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn ssh to {}", host))?;
        let stdout = child
            .stdout
            .take()
            .context("ssh process has no standard output")?;
        Ok(Self {
            reader: Box::new(BufReader::new(stdout)),
            child: Some(child),
        })
    }

    pub fn finish(self) -> Result<()> {
        drop(self.reader);
        if let Some(mut child) = self.child {
            let status = child.wait().context("failed to wait for peer process")?;
            if !status.success() {
                bail!("peer process exited with {}", status);
            }
        }
        Ok(())
    }
}

impl Read for ChannelSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

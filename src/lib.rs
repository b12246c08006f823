//! Snapsync library
//!
//! Diff-transfer protocol and chunk-application engine for replicating the
//! changed byte ranges of a snapshotted block device.

pub mod apply;
pub mod config;
pub mod device;
pub mod diff;
pub mod logger;
pub mod progress;
pub mod protocol;
pub mod send;
pub mod snapback;
pub mod transport;

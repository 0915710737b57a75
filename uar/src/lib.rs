//! UAR (Universal Archive): a self-contained archive format with
//! creation, streaming serialization, inspection, and extraction.
//!
//! The library is organized leaves-first: [`path`] and [`entry`] are the
//! types everything else builds on; [`header`] defines the on-disk layout;
//! [`spool`] and [`tree`] build an in-construction archive; [`finalize`]
//! writes it to disk; [`reader`] and [`extract`] read one back.

pub mod diagnostics;
pub mod entry;
pub mod extract;
pub mod finalize;
pub mod header;
pub mod path;
pub mod platform;
pub mod reader;
pub mod spool;
pub mod tree;


use std::io;

/// Errors returned from UAR operations.
///
/// Structural failures; per-entry failures during tree ingestion or
/// extraction are reported through a [`diagnostics::Diagnostic`] callback
/// instead and do not appear here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u16),
    #[error("invalid archive: {0}")]
    InvalidArchive(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid file: {0}")]
    InvalidFile(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("syscall failed: {0}")]
    SyscallError(#[source] io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

//! The in-construction archive: an in-memory index plus an anonymous
//! temporary data stream that payload bytes are appended to as entries are
//! added. [`Spool`] is the only way to build an archive; [`finalize`] is
//! the only way to turn one into a file.
//!
//! [`finalize`]: crate::finalize

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::stat::SFlag;
use nix::unistd::{getgid, getuid};

use crate::diagnostics::Diagnostic;
use crate::entry::{Entry, EntryKind};
use crate::path::{self, Normalized};
use crate::Error;

/// Maximum chunk size used when streaming a source file's bytes into the
/// spool, matching the finalizer's own chunk size.
const COPY_CHUNK: usize = 1024 * 1024;

/// An archive under construction.
///
/// Holds every [`Entry`] added so far, in insertion order, and the bytes
/// already spooled for file entries. The root directory entry (`"/"`) is
/// always present first, inserted by [`Spool::new`].
pub struct Spool {
    entries: Vec<Entry>,
    names: HashSet<String>,
    data: File,
    data_size: u64,
}

impl Spool {
    /// Create an empty in-construction archive: an anonymous temporary data
    /// stream plus a root directory entry.
    pub fn new() -> Result<Self, Error> {
        let data = tempfile::tempfile().map_err(Error::SyscallError)?;
        let mut spool = Spool {
            entries: Vec::new(),
            names: HashSet::new(),
            data,
            data_size: 0,
        };
        spool.insert_root();
        tracing::info!("spool created");
        Ok(spool)
    }

    /// Insert the mandatory root directory entry with the current process's
    /// uid/gid, mode `0755 | S_IFDIR`, and `mtime = now`, per spec.md §4.4.
    fn insert_root(&mut self) {
        let mode = 0o755 | SFlag::S_IFDIR.bits() as u32;
        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let uid = getuid().as_raw();
        let gid = getgid().as_raw();
        let root = Entry::new_directory("/", mode, mtime, uid, gid);
        self.names.insert(root.name.clone());
        self.entries.push(root);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    fn canonicalize(&self, raw_name: &str, diagnostics: &mut dyn FnMut(&crate::diagnostics::Diagnostic)) -> Result<String, Error> {
        let Normalized { path, warning } = path::normalize(raw_name)?;
        if let Some(message) = warning {
            diagnostics(&crate::diagnostics::Diagnostic::warning(raw_name, message));
        }
        if self.names.contains(&path) {
            return Err(Error::InvalidOperation(format!(
                "duplicate entry name {path:?}"
            )));
        }
        Ok(path)
    }

    /// Record a directory entry. Its recursive size starts at zero and
    /// grows as descendant files are added via [`Spool::bump_ancestor_sizes`].
    pub fn add_directory(
        &mut self,
        name: &str,
        mode: u32,
        mtime: i64,
        uid: u32,
        gid: u32,
        diagnostics: &mut dyn FnMut(&crate::diagnostics::Diagnostic),
    ) -> Result<(), Error> {
        let name = self.canonicalize(name, diagnostics)?;
        tracing::debug!(%name, "adding directory entry");
        self.names.insert(name.clone());
        self.entries.push(Entry::new_directory(name.clone(), mode, mtime, uid, gid));
        diagnostics(&Diagnostic::info(format!("added directory {name}")));
        Ok(())
    }

    /// Record a symlink entry. `target` is stored verbatim, not resolved.
    pub fn add_symlink(
        &mut self,
        name: &str,
        target: &str,
        mode: u32,
        mtime: i64,
        uid: u32,
        gid: u32,
        diagnostics: &mut dyn FnMut(&crate::diagnostics::Diagnostic),
    ) -> Result<(), Error> {
        if target.is_empty() || target.len() > path::PATH_MAX {
            return Err(Error::InvalidPath(target.to_string()));
        }
        let name = self.canonicalize(name, diagnostics)?;
        tracing::debug!(%name, %target, "adding symlink entry");
        self.names.insert(name.clone());
        self.entries
            .push(Entry::new_symlink(name.clone(), target, mode, mtime, uid, gid));
        diagnostics(&Diagnostic::info(format!("added symlink {name}")));
        Ok(())
    }

    /// Stream a regular file's contents from `source` into the spool and
    /// record an entry with `offset = current data_size`.
    ///
    /// The size recorded is whatever `source` actually yields, read once
    /// from the opened stream rather than taken from a prior `stat` call,
    /// so a file that grows or shrinks between `lstat` and this read is
    /// reflected faithfully instead of rejected. On a genuine I/O error
    /// partway through the read, the partially-appended bytes are
    /// discarded (the spool's `data_size` is rolled back) and no entry is
    /// added, matching the invariant that a failed add leaves `data_size`
    /// unchanged.
    pub fn add_regular<R: Read>(
        &mut self,
        name: &str,
        mut source: R,
        mode: u32,
        mtime: i64,
        uid: u32,
        gid: u32,
        diagnostics: &mut dyn FnMut(&crate::diagnostics::Diagnostic),
    ) -> Result<u64, Error> {
        let name = self.canonicalize(name, diagnostics)?;
        let start_offset = self.data_size;

        self.data
            .seek(SeekFrom::Start(start_offset))
            .map_err(Error::SyscallError)?;

        let mut written: u64 = 0;
        let mut buf = vec![0u8; COPY_CHUNK];
        let result = loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(err) => break Err(Error::SyscallError(err)),
            };
            if let Err(err) = self.data.write_all(&buf[..n]) {
                break Err(Error::SyscallError(err));
            }
            written += n as u64;
        };

        if let Err(err) = result {
            self.data.set_len(start_offset).map_err(Error::SyscallError)?;
            return Err(err);
        }

        self.data_size = start_offset + written;
        self.names.insert(name.clone());
        self.entries
            .push(Entry::new_file(name.clone(), start_offset, written, mode, mtime, uid, gid));
        diagnostics(&Diagnostic::info(format!("added file {name} ({written} bytes)")));
        tracing::debug!(%written, "added regular file entry");

        Ok(written)
    }

    /// Add `amount` to the recursive size of every ancestor directory of
    /// `path` that has already been added (including the root).
    pub fn bump_ancestor_sizes(&mut self, path: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        let mut ancestors = Vec::new();
        let mut current = path;
        while let Some(idx) = current.rfind('/') {
            let parent = if idx == 0 { "/" } else { &current[..idx] };
            ancestors.push(parent.to_string());
            if parent == "/" {
                break;
            }
            current = parent;
        }
        for entry in self.entries.iter_mut() {
            if matches!(entry.kind, EntryKind::Directory { .. }) && ancestors.iter().any(|a| a == &entry.name) {
                entry.add_size(amount);
            }
        }
    }

    /// Split the spool into its finished entry index and a seeked-to-start
    /// reader over the spooled data, for the finalizer to consume.
    pub fn into_parts(mut self) -> Result<(Vec<Entry>, File, u64), Error> {
        self.data.seek(SeekFrom::Start(0)).map_err(Error::SyscallError)?;
        Ok((self.entries, self.data, self.data_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_spool_has_root() {
        let spool = Spool::new().unwrap();
        assert_eq!(spool.entries().len(), 1);
        assert!(spool.entries()[0].is_directory());
        assert_eq!(spool.entries()[0].name, "/");
    }

    #[test]
    fn add_regular_tracks_offsets() {
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &crate::diagnostics::Diagnostic| {};
        spool
            .add_regular("/a.txt", &b"hello"[..], 0o644, 0, 0, 0, &mut noop)
            .unwrap();
        spool
            .add_regular("/b.txt", &b"world!"[..], 0o644, 0, 0, 0, &mut noop)
            .unwrap();

        let EntryKind::File { offset, size } = spool.entries()[1].kind else {
            panic!("expected file entry");
        };
        assert_eq!((offset, size), (0, 5));
        let EntryKind::File { offset, size } = spool.entries()[2].kind else {
            panic!("expected file entry");
        };
        assert_eq!((offset, size), (5, 6));
        assert_eq!(spool.data_size(), 11);
    }

    #[test]
    fn add_regular_records_actual_bytes_read_not_a_prior_stat_size() {
        // The caller's `lstat`-derived size estimate is never consulted;
        // whatever the stream actually yields is what gets recorded, so a
        // file that grew or shrank since `lstat` is reflected faithfully.
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &crate::diagnostics::Diagnostic| {};
        let written = spool
            .add_regular("/grew.txt", &b"longer than expected"[..], 0o644, 0, 0, 0, &mut noop)
            .unwrap();
        assert_eq!(written, 21);
        let EntryKind::File { size, .. } = spool.entries()[1].kind else {
            panic!("expected file entry");
        };
        assert_eq!(size, 21);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &crate::diagnostics::Diagnostic| {};
        spool
            .add_directory("/dir", 0o755, 0, 0, 0, &mut noop)
            .unwrap();
        let err = spool.add_directory("/dir", 0o755, 0, 0, 0, &mut noop);
        assert!(err.is_err());
    }

    /// A [`Read`] impl that yields a few bytes and then a genuine I/O
    /// error, simulating e.g. an `EIO` partway through a source file.
    struct FailingReader {
        remaining: &'static [u8],
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.remaining.is_empty() {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "simulated I/O error"));
            }
            let n = std::cmp::min(buf.len(), self.remaining.len());
            buf[..n].copy_from_slice(&self.remaining[..n]);
            self.remaining = &self.remaining[n..];
            Ok(n)
        }
    }

    #[test]
    fn io_error_mid_read_rolls_back_data_size() {
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &crate::diagnostics::Diagnostic| {};
        let before = spool.data_size();
        let source = FailingReader { remaining: b"abc" };
        let err = spool.add_regular("/broken.txt", source, 0o644, 0, 0, 0, &mut noop);
        assert!(err.is_err());
        assert_eq!(spool.data_size(), before);
        assert!(spool.entries().iter().all(|e| e.name != "/broken.txt"));
    }
}

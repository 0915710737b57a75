//! Materializes an opened [`Archive`]'s entries under a destination root.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::diagnostics::Diagnostic;
use crate::entry::EntryKind;
use crate::reader::Archive;
use crate::Error;

const COPY_CHUNK: usize = 1024;

/// Extract every entry of `archive` under `dest`, in index order.
///
/// Per-entry failures (metadata restoration, a pre-existing path at the
/// destination) are reported through `diagnostics` and that entry is
/// skipped; unrecoverable failures (destination unreachable, a seek
/// failure reading the archive) abort and propagate.
pub fn extract(
    archive: &mut Archive,
    dest: &Path,
    diagnostics: &mut dyn FnMut(&Diagnostic),
) -> Result<(), Error> {
    let dest = dest
        .canonicalize()
        .map_err(|err| Error::InvalidArgument(format!("{}: {err}", dest.display())))?;

    let entries = archive.entries().to_vec();
    for entry in entries {
        let relative = strip_leading_dot_prefix(&entry.name);
        let target = dest.join(&relative);

        if !crate::path::is_within(&dest, Path::new(&relative)) {
            diagnostics(&Diagnostic::warning(
                entry.name.clone(),
                "entry path escapes destination root, skipping",
            ));
            continue;
        }

        let is_root_sentinel = entry.name == "/" && entry.is_directory();

        // Per spec, only destination-unreachable (checked above, before the
        // loop starts) and a seek failure reading the archive's own data
        // block are unrecoverable; every other per-entry failure here is
        // reported as a warning and extraction continues.
        if !is_root_sentinel {
            if let Err(err) = materialize(archive, &entry.kind, &target, entry.mode) {
                diagnostics(&Diagnostic::warning(entry.name.clone(), err.to_string()));
                continue;
            }
        }

        if let Err(err) = restore_metadata(&target, entry.mtime, entry.uid, entry.gid) {
            diagnostics(&Diagnostic::warning(entry.name.clone(), err.to_string()));
            continue;
        }

        diagnostics(&Diagnostic::info(format!("extracted {}", entry.name)));
    }

    Ok(())
}

/// Remove at most one leading `/`, `./`, `../`, `..`, or `.` component, so
/// the result is always relative and safe to `join` onto the destination.
fn strip_leading_dot_prefix(name: &str) -> PathBuf {
    let stripped = name
        .strip_prefix("../")
        .or_else(|| name.strip_prefix("./"))
        .or_else(|| name.strip_prefix('/'))
        .unwrap_or(name);
    let stripped = stripped.strip_prefix("..").unwrap_or(stripped);
    let stripped = stripped.strip_prefix('.').unwrap_or(stripped);
    PathBuf::from(stripped.trim_start_matches('/'))
}

fn materialize(
    archive: &mut Archive,
    kind: &EntryKind,
    target: &Path,
    mode: u32,
) -> Result<(), Error> {
    match kind {
        EntryKind::Directory { .. } => {
            // Entries are materialized in index order and invariant 7
            // guarantees a directory's parent is an earlier entry, so a
            // single-level `mkdir` (not `create_dir_all`) is always enough.
            crate::platform::mkdir(target, mode & 0o7777)?;
            crate::platform::chmod(target, mode & 0o7777)?;
            Ok(())
        }
        EntryKind::File { offset, size } => {
            let mut out = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(target)
                .map_err(Error::SyscallError)?;

            let reader = archive.payload_reader(*offset)?;
            let mut remaining = *size;
            let mut buf = [0u8; COPY_CHUNK];
            while remaining > 0 {
                let to_read = std::cmp::min(remaining, COPY_CHUNK as u64) as usize;
                reader
                    .read_exact(&mut buf[..to_read])
                    .map_err(Error::SyscallError)?;
                out.write_all(&buf[..to_read]).map_err(Error::SyscallError)?;
                remaining -= to_read as u64;
            }
            crate::platform::chmod(target, mode & 0o7777)?;
            Ok(())
        }
        EntryKind::Symlink { target: link_target } => {
            crate::platform::symlink(link_target, target)
        }
    }
}

fn restore_metadata(target: &Path, mtime: i64, uid: u32, gid: u32) -> Result<(), Error> {
    crate::platform::set_mtime(target, mtime)?;
    crate::platform::chown(target, uid, gid)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spool::Spool;

    #[test]
    fn extracts_a_file_and_a_symlink() {
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &Diagnostic| {};
        spool
            .add_regular("/hello.txt", &b"hello world!!"[..], 0o644, 0, 0, 0, &mut noop)
            .unwrap();
        spool
            .add_symlink("/link", "../outside", 0o777, 0, 0, 0, &mut noop)
            .unwrap();

        let archive_dir = tempfile::TempDir::new().unwrap();
        let archive_path = archive_dir.path().join("out.uar");
        crate::finalize::finalize(spool, &archive_path).unwrap();

        let dest_dir = tempfile::TempDir::new().unwrap();
        let mut archive = Archive::open(&archive_path).unwrap();
        let mut diagnostics = Vec::new();
        let mut sink = |d: &Diagnostic| diagnostics.push(d.clone());
        extract(&mut archive, dest_dir.path(), &mut sink).unwrap();

        let content = fs::read(dest_dir.path().join("hello.txt")).unwrap();
        assert_eq!(content, b"hello world!!");

        let link_target = fs::read_link(dest_dir.path().join("link")).unwrap();
        assert_eq!(link_target, PathBuf::from("../outside"));
    }

    #[test]
    fn creates_nested_directories() {
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &Diagnostic| {};
        spool
            .add_directory("/sub", 0o755, 0, 0, 0, &mut noop)
            .unwrap();
        spool
            .add_regular("/sub/nested.txt", &b"nested"[..], 0o644, 0, 0, 0, &mut noop)
            .unwrap();

        let archive_dir = tempfile::TempDir::new().unwrap();
        let archive_path = archive_dir.path().join("out.uar");
        crate::finalize::finalize(spool, &archive_path).unwrap();

        let dest_dir = tempfile::TempDir::new().unwrap();
        let mut archive = Archive::open(&archive_path).unwrap();
        let mut sink = |_: &Diagnostic| {};
        extract(&mut archive, dest_dir.path(), &mut sink).unwrap();

        let content = fs::read(dest_dir.path().join("sub/nested.txt")).unwrap();
        assert_eq!(content, b"nested");
    }
}

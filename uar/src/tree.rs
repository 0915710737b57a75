//! Recursive, synchronous ingestion of a host directory tree into a
//! [`Spool`].
//!
//! Structured the way the teacher structures its own recursive directory
//! walk (a small public entry point calling a private recursive helper that
//! logs at `trace` as it descends), generalized from an async/`Future`
//! walk to a plain synchronous one: this format is built and read
//! strictly single-threaded, with no additional suspension points.

use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::Diagnostic;
use crate::platform::{self, NodeKind};
use crate::spool::Spool;
use crate::Error;

/// Walk `root` on the host filesystem and add every file, directory, and
/// symlink beneath it (`root` itself included) to `spool` under `archive_name`.
///
/// Per-entry failures -- a file that vanished between `readdir` and
/// `lstat`, an unsupported node kind (device, fifo, socket) -- are reported
/// through `diagnostics` and that entry is skipped; the walk continues.
/// Only I/O failures against the spool's own temporary storage are fatal.
pub fn add_tree(
    spool: &mut Spool,
    root: &Path,
    archive_name: &str,
    diagnostics: &mut dyn FnMut(&Diagnostic),
) -> Result<(), Error> {
    let meta = platform::lstat(root)?;
    if meta.kind != NodeKind::Directory {
        return Err(Error::InvalidArgument(format!(
            "{}: tree root must be a directory",
            root.display()
        )));
    }

    if archive_name != "/" {
        spool.add_directory(
            archive_name,
            meta.mode,
            meta.mtime,
            meta.uid,
            meta.gid,
            diagnostics,
        )?;
    }

    walk_directory(spool, root, archive_name, diagnostics)
}

fn walk_directory(
    spool: &mut Spool,
    host_path: &Path,
    archive_path: &str,
    diagnostics: &mut dyn FnMut(&Diagnostic),
) -> Result<(), Error> {
    tracing::trace!(?host_path, "processing directory");

    let read_dir = match fs::read_dir(host_path) {
        Ok(iter) => iter,
        Err(err) => {
            diagnostics(&Diagnostic::warning(
                host_path.display().to_string(),
                format!("failed to read directory: {err}"),
            ));
            return Ok(());
        }
    };

    let mut children: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        match entry {
            Ok(entry) => children.push(entry.path()),
            Err(err) => diagnostics(&Diagnostic::warning(
                host_path.display().to_string(),
                format!("failed to read directory entry: {err}"),
            )),
        }
    }
    children.sort();

    for child_host_path in children {
        let Some(file_name) = child_host_path.file_name().and_then(|n| n.to_str()) else {
            diagnostics(&Diagnostic::warning(
                child_host_path.display().to_string(),
                "skipping entry with non-utf8 name",
            ));
            continue;
        };
        let child_archive_path = crate::path::join(archive_path, file_name);

        let meta = match platform::lstat(&child_host_path) {
            Ok(meta) => meta,
            Err(err) => {
                diagnostics(&Diagnostic::warning(
                    child_host_path.display().to_string(),
                    format!("lstat failed: {err}"),
                ));
                continue;
            }
        };

        match meta.kind {
            NodeKind::Directory => {
                if let Err(err) = spool.add_directory(
                    &child_archive_path,
                    meta.mode,
                    meta.mtime,
                    meta.uid,
                    meta.gid,
                    diagnostics,
                ) {
                    diagnostics(&Diagnostic::warning(child_archive_path.clone(), err.to_string()));
                    continue;
                }
                walk_directory(spool, &child_host_path, &child_archive_path, diagnostics)?;
            }
            NodeKind::File => {
                let file = match fs::File::open(&child_host_path) {
                    Ok(file) => file,
                    Err(err) => {
                        diagnostics(&Diagnostic::warning(
                            child_archive_path.clone(),
                            format!("failed to open file: {err}"),
                        ));
                        continue;
                    }
                };
                let result = spool.add_regular(
                    &child_archive_path,
                    file,
                    meta.mode,
                    meta.mtime,
                    meta.uid,
                    meta.gid,
                    diagnostics,
                );
                match result {
                    Ok(written) => spool.bump_ancestor_sizes(&child_archive_path, written),
                    Err(err) => diagnostics(&Diagnostic::warning(child_archive_path.clone(), err.to_string())),
                }
            }
            NodeKind::Symlink => {
                let target = match platform::readlink(&child_host_path) {
                    Ok(target) => target,
                    Err(err) => {
                        diagnostics(&Diagnostic::warning(
                            child_archive_path.clone(),
                            format!("readlink failed: {err}"),
                        ));
                        continue;
                    }
                };
                if let Err(err) = spool.add_symlink(
                    &child_archive_path,
                    &target,
                    meta.mode,
                    meta.mtime,
                    meta.uid,
                    meta.gid,
                    diagnostics,
                ) {
                    diagnostics(&Diagnostic::warning(child_archive_path.clone(), err.to_string()));
                }
            }
            NodeKind::Other => {
                let err = Error::InvalidFile(child_host_path.display().to_string());
                diagnostics(&Diagnostic::warning(child_archive_path.clone(), err.to_string()));
            }
        }
    }

    Ok(())
}

//! Thin wrappers over the POSIX syscalls the tree ingester and extractor
//! need, built on [`nix`] rather than hand-rolled FFI bindings.
//!
//! Grounded in how other pack repos reach for `nix` to do exactly this kind
//! of platform-syscall work rather than binding `libc` directly.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use nix::sys::stat::{Mode, SFlag};
use nix::unistd::{Gid, Uid};

use crate::Error;

/// Kind of filesystem object, as classified by `lstat` (never `stat`: a
/// symlink must never be followed during ingestion).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
    /// Anything else (device, fifo, socket): callers skip these per the
    /// format's scope, reporting a diagnostic.
    Other,
}

#[derive(Debug, Copy, Clone)]
pub struct NodeMetadata {
    pub kind: NodeKind,
    pub mode: u32,
    pub mtime: i64,
    pub uid: u32,
    pub gid: u32,
}

/// `lstat` a path without following a terminal symlink.
///
/// Deliberately does not surface `stat`'s `st_size`: per spec.md §4.4, a
/// regular file's recorded size comes from bytes actually read off the
/// opened stream, not from this metadata, so a growth race between this
/// call and the read doesn't corrupt the archive.
pub fn lstat(path: &Path) -> Result<NodeMetadata, Error> {
    let meta = std::fs::symlink_metadata(path).map_err(Error::SyscallError)?;
    let kind = if meta.is_symlink() {
        NodeKind::Symlink
    } else if meta.is_dir() {
        NodeKind::Directory
    } else if meta.is_file() {
        NodeKind::File
    } else {
        NodeKind::Other
    };
    Ok(NodeMetadata {
        kind,
        mode: meta.permissions().mode(),
        mtime: meta.mtime(),
        uid: meta.uid(),
        gid: meta.gid(),
    })
}

/// Read a symlink's raw target text.
pub fn readlink(path: &Path) -> Result<String, Error> {
    let target = nix::fcntl::readlink(path).map_err(|errno| {
        Error::SyscallError(std::io::Error::from_raw_os_error(errno as i32))
    })?;
    target
        .into_string()
        .map_err(|_| Error::InvalidPath(path.display().to_string()))
}

/// Create a directory, restoring the recorded mode.
pub fn mkdir(path: &Path, mode: u32) -> Result<(), Error> {
    let mode = Mode::from_bits_truncate(mode);
    match nix::unistd::mkdir(path, mode) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(errno) => Err(Error::SyscallError(std::io::Error::from_raw_os_error(
            errno as i32,
        ))),
    }
}

/// Create a symlink pointing at `target`.
pub fn symlink(target: &str, link_path: &Path) -> Result<(), Error> {
    nix::unistd::symlinkat(target, None, link_path).map_err(|errno| {
        Error::SyscallError(std::io::Error::from_raw_os_error(errno as i32))
    })
}

/// Restore a path's owning uid/gid. Per §9's resolved open question: a
/// permission failure here is reported as a warning, never a fatal error.
pub fn chown(path: &Path, uid: u32, gid: u32) -> Result<(), Error> {
    nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(
        |errno| Error::SyscallError(std::io::Error::from_raw_os_error(errno as i32)),
    )
}

/// Restore a path's permission bits.
pub fn chmod(path: &Path, mode: u32) -> Result<(), Error> {
    let mode = Mode::from_bits_truncate(mode & !(SFlag::S_IFMT.bits() as u32));
    nix::sys::stat::fchmodat(
        None,
        path,
        mode,
        nix::sys::stat::FchmodatFlags::FollowSymlink,
    )
    .map_err(|errno| Error::SyscallError(std::io::Error::from_raw_os_error(errno as i32)))
}

/// Restore a path's modification time, leaving access time untouched.
pub fn set_mtime(path: &Path, mtime: i64) -> Result<(), Error> {
    use nix::sys::stat::{utimensat, UtimensatFlags};
    use nix::sys::time::TimeSpec;

    let now = TimeSpec::new(0, nix::libc::UTIME_OMIT as i64);
    let mtime_spec = TimeSpec::new(mtime, 0);
    utimensat(
        None,
        path,
        &now,
        &mtime_spec,
        UtimensatFlags::NoFollowSymlink,
    )
    .map_err(|errno| Error::SyscallError(std::io::Error::from_raw_os_error(errno as i32)))
}

//! The entry model shared by the spool writer, the finalizer, and the
//! reader: a directory, a regular file, or a symbolic link, tagged with the
//! attributes common to all three.

/// Kind-specific payload of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file. `offset` is the byte offset into the archive's data
    /// block where the file's contents begin; `size` is its length in
    /// bytes.
    File { offset: u64, size: u64 },
    /// A directory. `size` is the recursive sum of the sizes of every
    /// regular file beneath it.
    Directory { size: u64 },
    /// A symbolic link; `target` is the link's raw, unresolved target text.
    Symlink { target: String },
}

/// A single member of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Canonical, absolute path of this entry within the archive.
    pub name: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub mtime: i64,
    pub uid: u32,
    pub gid: u32,
}

impl Entry {
    pub fn new_directory(name: impl Into<String>, mode: u32, mtime: i64, uid: u32, gid: u32) -> Self {
        Entry {
            name: name.into(),
            kind: EntryKind::Directory { size: 0 },
            mode,
            mtime,
            uid,
            gid,
        }
    }

    pub fn new_file(
        name: impl Into<String>,
        offset: u64,
        size: u64,
        mode: u32,
        mtime: i64,
        uid: u32,
        gid: u32,
    ) -> Self {
        Entry {
            name: name.into(),
            kind: EntryKind::File { offset, size },
            mode,
            mtime,
            uid,
            gid,
        }
    }

    pub fn new_symlink(
        name: impl Into<String>,
        target: impl Into<String>,
        mode: u32,
        mtime: i64,
        uid: u32,
        gid: u32,
    ) -> Self {
        Entry {
            name: name.into(),
            kind: EntryKind::Symlink {
                target: target.into(),
            },
            mode,
            mtime,
            uid,
            gid,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, EntryKind::Symlink { .. })
    }

    /// Logical size of this entry: a file's byte length, a directory's
    /// recursive descendant size, or zero for a symlink.
    pub fn size(&self) -> u64 {
        match &self.kind {
            EntryKind::File { size, .. } => *size,
            EntryKind::Directory { size } => *size,
            EntryKind::Symlink { .. } => 0,
        }
    }

    /// Set this entry's mode after construction. Mirrors the original C
    /// `uar_file_set_mode`, for callers that build entries programmatically
    /// rather than from a `lstat` call.
    pub fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    pub fn set_mtime(&mut self, mtime: i64) {
        self.mtime = mtime;
    }

    pub fn set_owner(&mut self, uid: u32, gid: u32) {
        self.uid = uid;
        self.gid = gid;
    }

    /// Add to a directory entry's recursive size. No-op for non-directories.
    pub(crate) fn add_size(&mut self, amount: u64) {
        if let EntryKind::Directory { size } = &mut self.kind {
            *size += amount;
        }
    }
}

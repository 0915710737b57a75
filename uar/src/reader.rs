//! Opens an existing archive file and validates it strictly up front: by
//! the time [`Archive::open`] returns, the full entry index has been
//! parsed and every length bounds-checked. Extraction and listing then
//! operate over that validated, in-memory index plus a handle to the file
//! for streaming payload bytes out of the data block.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::entry::Entry;
use crate::header::{EntryRecord, Header, ENTRY_RECORD_SIZE, HEADER_SIZE};
use crate::Error;

/// An opened, validated archive.
pub struct Archive {
    file: File,
    header: Header,
    entries: Vec<Entry>,
    /// Byte offset in the file at which the data block begins: the header
    /// plus every entry record and its trailing name/link bytes.
    data_block_offset: u64,
}

impl Archive {
    /// Open and strictly validate an archive at `path`.
    ///
    /// Validation covers: magic, version, zero flags, and -- for every
    /// entry -- name/link length bounds and, for regular files,
    /// `offset + size <= header.data_size`.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(Error::SyscallError)?;
        let file_len = file.metadata().map_err(Error::SyscallError)?.len();
        let mut reader = BufReader::new(file);

        let header = Header::read_from(&mut reader)?;

        let remaining = file_len
            .checked_sub(HEADER_SIZE as u64)
            .ok_or_else(|| Error::InvalidArchive("file shorter than header".into()))?;
        if header.data_size > remaining {
            return Err(Error::InvalidArchive(
                "data_size exceeds bytes available after header".into(),
            ));
        }
        let index_budget = remaining - header.data_size;
        if header
            .entry_count
            .saturating_mul(ENTRY_RECORD_SIZE as u64)
            > index_budget
        {
            return Err(Error::InvalidArchive(
                "entry_count exceeds bytes available for the index".into(),
            ));
        }

        let mut entries = Vec::with_capacity(header.entry_count as usize);
        let mut index_bytes: u64 = HEADER_SIZE as u64;
        for _ in 0..header.entry_count {
            let before = index_bytes;
            let entry = EntryRecord::read_from(&mut reader)?;
            index_bytes += ENTRY_RECORD_SIZE as u64 + entry.name.len() as u64;
            if let crate::entry::EntryKind::Symlink { target } = &entry.kind {
                index_bytes += target.len() as u64;
            }
            if index_bytes < before {
                return Err(Error::InvalidArchive("index length overflow".into()));
            }
            if let crate::entry::EntryKind::File { offset, size } = &entry.kind {
                let end = offset
                    .checked_add(*size)
                    .ok_or_else(|| Error::InvalidArchive("file entry size overflow".into()))?;
                if end > header.data_size {
                    return Err(Error::InvalidArchive(format!(
                        "{}: entry extends past data block",
                        entry.name
                    )));
                }
            }
            entries.push(entry);
        }

        if index_bytes.saturating_add(header.data_size) > file_len {
            return Err(Error::InvalidArchive(
                "index and data block exceed file length".into(),
            ));
        }

        tracing::info!(entries = entries.len(), "archive opened");

        Ok(Archive {
            file: reader.into_inner(),
            header,
            entries,
            data_block_offset: index_bytes,
        })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry_count(&self) -> u64 {
        self.header.entry_count
    }

    pub fn data_size(&self) -> u64 {
        self.header.data_size
    }

    pub fn data_block_offset(&self) -> u64 {
        self.data_block_offset
    }

    /// Read exactly `size` bytes of a regular file entry's payload,
    /// starting at `offset` within the data block.
    pub(crate) fn read_payload(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, Error> {
        self.file
            .seek(SeekFrom::Start(self.data_block_offset + offset))
            .map_err(Error::SyscallError)?;
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact(&mut buf).map_err(Error::SyscallError)?;
        Ok(buf)
    }

    /// A reader positioned at the start of a regular file entry's payload,
    /// for streaming extraction instead of buffering the whole entry.
    pub(crate) fn payload_reader(&mut self, offset: u64) -> Result<&mut File, Error> {
        self.file
            .seek(SeekFrom::Start(self.data_block_offset + offset))
            .map_err(Error::SyscallError)?;
        Ok(&mut self.file)
    }

    /// Print a human-readable dump of every entry: type, name, size.
    /// Mirrors the original C implementation's debug dumper.
    #[cfg(debug_assertions)]
    pub fn debug_dump<W: std::io::Write>(&self, mut w: W) -> std::io::Result<()> {
        for entry in &self.entries {
            let kind = match &entry.kind {
                crate::entry::EntryKind::File { .. } => "file",
                crate::entry::EntryKind::Directory { .. } => "dir",
                crate::entry::EntryKind::Symlink { target } => {
                    writeln!(w, "link {} -> {}", entry.name, target)?;
                    continue;
                }
            };
            writeln!(w, "{kind} {} ({} bytes)", entry.name, entry.size())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spool::Spool;

    #[test]
    fn opens_a_finalized_archive() {
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &crate::diagnostics::Diagnostic| {};
        spool
            .add_regular("/hello.txt", &b"hello world!!"[..], 0o644, 0, 0, 0, &mut noop)
            .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("out.uar");
        crate::finalize::finalize(spool, &dest).unwrap();

        let mut archive = Archive::open(&dest).unwrap();
        assert_eq!(archive.entry_count(), 2);
        let file_entry = archive
            .entries()
            .iter()
            .find(|e| e.name == "/hello.txt")
            .unwrap()
            .clone();
        let crate::entry::EntryKind::File { offset, size } = file_entry.kind else {
            panic!("expected file");
        };
        let payload = archive.read_payload(offset, size).unwrap();
        assert_eq!(payload, b"hello world!!");
    }

    #[test]
    fn rejects_truncated_file_entry() {
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &crate::diagnostics::Diagnostic| {};
        spool
            .add_regular("/a.txt", &b"hi"[..], 0o644, 0, 0, 0, &mut noop)
            .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("out.uar");
        crate::finalize::finalize(spool, &dest).unwrap();

        let mut bytes = std::fs::read(&dest).unwrap();
        // Corrupt the data_size field in the header to be smaller than what
        // the entry claims, to trigger the offset+size <= data_size check.
        bytes[18..26].copy_from_slice(&0u64.to_le_bytes());
        std::fs::write(&dest, &bytes).unwrap();

        assert!(Archive::open(&dest).is_err());
    }
}

//! Turns an in-construction [`Spool`] into a finished archive file: header,
//! then entry index (records plus trailing name/link bytes), then the
//! spooled data block streamed in bounded chunks.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::header::{EntryRecord, Header};
use crate::spool::Spool;
use crate::Error;

/// Chunk size used when streaming the spooled data block to its final
/// destination.
const COPY_CHUNK: usize = 1024 * 1024;

/// Write `spool` out as a finished archive at `destination`.
pub fn finalize(spool: Spool, destination: &Path) -> Result<(), Error> {
    let (entries, mut data, data_size) = spool.into_parts()?;

    let file = File::create(destination).map_err(Error::SyscallError)?;
    let mut writer = BufWriter::new(file);

    let header = Header::new(entries.len() as u64, data_size);
    header.write_to(&mut writer)?;

    for entry in &entries {
        EntryRecord::write_to(entry, &mut writer)?;
    }

    stream_data(&mut data, &mut writer, data_size)?;

    writer.flush().map_err(Error::SyscallError)?;
    tracing::info!(entries = entries.len(), %data_size, "archive finalized");
    Ok(())
}

fn stream_data<W: Write>(source: &mut File, dest: &mut W, total: u64) -> Result<(), Error> {
    let mut remaining = total;
    let mut buf = vec![0u8; COPY_CHUNK];
    while remaining > 0 {
        let to_read = std::cmp::min(remaining, COPY_CHUNK as u64) as usize;
        source
            .read_exact(&mut buf[..to_read])
            .map_err(Error::SyscallError)?;
        dest.write_all(&buf[..to_read]).map_err(Error::SyscallError)?;
        remaining -= to_read as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalizes_a_simple_archive() {
        let mut spool = Spool::new().unwrap();
        let mut noop = |_: &crate::diagnostics::Diagnostic| {};
        spool
            .add_regular("/hello.txt", &b"hello world!!"[..], 0o644, 0, 0, 0, &mut noop)
            .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("out.uar");
        finalize(spool, &dest).unwrap();

        let bytes = std::fs::read(&dest).unwrap();
        assert_eq!(&bytes[0..4], &crate::header::MAGIC);
        assert!(bytes.len() > crate::header::HEADER_SIZE);
    }
}

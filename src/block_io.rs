// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block-granularity I/O over a single file.
//!
//! A [`BlockIo`] is the sole owner of its file handle (spec.md §5): no
//! other component reads or writes the underlying file directly. Block 0
//! has no special meaning here — callers (the index file format vs. the
//! data file format) decide what block 0 holds.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default block size in bytes (spec.md §6).
pub const BLOCK_SIZE: usize = 4096;

/// Fixed-size paged I/O over a single file.
#[derive(Debug)]
pub struct BlockIo {
    path: PathBuf,
    file: File,
    block_size: usize,
}

impl BlockIo {
    /// Opens (creating if necessary) the file at `path` for block I/O with
    /// the default [`BLOCK_SIZE`].
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        Self::open_with_block_size(path, BLOCK_SIZE)
    }

    /// Opens (creating if necessary) the file at `path` for block I/O with
    /// an explicit block size.
    pub fn open_with_block_size(path: impl Into<PathBuf>, block_size: usize) -> crate::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        log::debug!("opened block file {} (block_size={block_size})", path.display());
        Ok(Self {
            path,
            file,
            block_size,
        })
    }

    /// The file path this instance owns.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The block size this instance was opened with.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Highest block index present in the file, or `-1` if the file is
    /// empty.
    pub fn last_block_index(&self) -> crate::Result<i64> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Ok(-1);
        }
        Ok((len / self.block_size as u64) as i64 - 1)
    }

    /// Reads exactly [`Self::block_size`] bytes for `block_idx`. Reads past
    /// the current end of file return zero-filled bytes rather than an
    /// error or a short read.
    pub fn read(&mut self, block_idx: u64) -> crate::Result<Vec<u8>> {
        let offset = block_idx * self.block_size as u64;
        let len = self.file.metadata()?.len();

        let mut buf = vec![0u8; self.block_size];
        if offset >= len {
            return Ok(buf);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let available = (len - offset).min(self.block_size as u64) as usize;
        self.file.read_exact(&mut buf[..available])?;
        Ok(buf)
    }

    /// Writes `data` starting at `block_idx`, zero-padding the final block
    /// up to the block size. If `data` is larger than one block, writes
    /// `ceil(data.len() / block_size)` consecutive blocks. The file is
    /// extended with zero blocks as needed so `block_idx` becomes a valid
    /// offset. Returns the number of blocks written.
    pub fn write(&mut self, block_idx: u64, data: &[u8]) -> crate::Result<u64> {
        let blocks_needed = data.len().div_ceil(self.block_size).max(1) as u64;
        let offset = block_idx * self.block_size as u64;

        self.extend_to(offset)?;

        self.file.seek(SeekFrom::Start(offset))?;
        let padded_len = blocks_needed as usize * self.block_size;
        let mut padded = vec![0u8; padded_len];
        padded[..data.len()].copy_from_slice(data);
        self.file.write_all(&padded)?;
        self.file.flush()?;

        log::trace!("wrote {blocks_needed} block(s) at block_idx={block_idx}");
        Ok(blocks_needed)
    }

    /// Zero-fills the block at `block_idx`. Does not truncate the file.
    pub fn delete(&mut self, block_idx: u64) -> crate::Result<()> {
        self.write(block_idx, &[]).map(|_| ())
    }

    fn extend_to(&mut self, offset: u64) -> crate::Result<()> {
        let len = self.file.metadata()?.len();
        if offset > len {
            self.file.set_len(offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn read_past_eof_is_zero_filled() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = BlockIo::open_with_block_size(dir.path().join("t.dat"), 64).unwrap();
        let block = io.read(5).unwrap();
        assert_eq!(block.len(), 64);
        assert!(block.iter().all(|&b| b == 0));
        assert_eq!(io.last_block_index().unwrap(), -1);
    }

    #[test]
    fn write_pads_and_extends() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = BlockIo::open_with_block_size(dir.path().join("t.dat"), 16).unwrap();
        io.write(2, b"hello").unwrap();

        assert_eq!(io.last_block_index().unwrap(), 2);

        let block = io.read(2).unwrap();
        assert_eq!(&block[..5], b"hello");
        assert!(block[5..].iter().all(|&b| b == 0));

        let file_len = std::fs::metadata(dir.path().join("t.dat")).unwrap().len();
        assert_eq!(file_len % 16, 0);
    }

    #[test]
    fn write_spans_multiple_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = BlockIo::open_with_block_size(dir.path().join("t.dat"), 16).unwrap();
        let data = vec![7u8; 40];
        let written = io.write(0, &data).unwrap();
        assert_eq!(written, 3);
        assert_eq!(io.last_block_index().unwrap(), 2);
    }

    #[test]
    fn block_alignment_holds_after_sequence_of_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = BlockIo::open_with_block_size(dir.path().join("t.dat"), 32).unwrap();
        for i in 0..10u64 {
            io.write(i, &[i as u8; 10]).unwrap();
            let file_len = std::fs::metadata(dir.path().join("t.dat")).unwrap().len();
            assert_eq!(file_len % 32, 0);
            assert_eq!(io.read(i).unwrap().len(), 32);
        }
    }

    #[test]
    fn delete_zero_fills_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = BlockIo::open_with_block_size(dir.path().join("t.dat"), 16).unwrap();
        io.write(0, b"xxxxxxxxxxxxxxxx").unwrap();
        io.delete(0).unwrap();
        assert_eq!(io.last_block_index().unwrap(), 0);
        assert!(io.read(0).unwrap().iter().all(|&b| b == 0));
    }
}

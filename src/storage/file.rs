//! Temp-file backed storage.

use super::ByteStorage;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug)]
struct OpenFile {
    /// Owns the file; dropping it removes the file from disk
    temp: NamedTempFile,
    writer: BufWriter<File>,
    /// Separate handle so reads never move the write cursor
    reader: BufReader<File>,
    /// Offset the reader is positioned at
    reader_pos: u64,
    /// Writer holds bytes the reader cannot see yet
    dirty: bool,
}

/// A store backed by an exclusive temporary file.
///
/// The file is created on construction and deleted on `close` or drop.
/// Appends go through a buffered writer; sequential reads through a buffered
/// reader that only seeks when the requested offset is not where the previous
/// read ended.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    file: Option<OpenFile>,
    len: u64,
}

impl FileStorage {
    /// Creates a new temp file named `<prefix>XXXXXX.tmp` inside `dir`.
    pub fn create_in(dir: &Path, prefix: &str, io_buffer_size: usize) -> Result<Self> {
        let temp = tempfile::Builder::new().prefix(prefix).suffix(".tmp").tempfile_in(dir)?;
        let writer = BufWriter::with_capacity(io_buffer_size, temp.as_file().try_clone()?);
        let reader = BufReader::with_capacity(io_buffer_size, temp.reopen()?);
        let path = temp.path().to_path_buf();
        log::debug!("created storage file {}", path.display());

        Ok(Self {
            path,
            file: Some(OpenFile { temp, writer, reader, reader_pos: 0, dirty: false }),
            len: 0,
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the file has been closed.
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn open_file(&mut self) -> Result<&mut OpenFile> {
        let path = &self.path;
        self.file
            .as_mut()
            .ok_or_else(|| Error::invalid_state(format!("storage file {} is closed", path.display())))
    }
}

impl ByteStorage for FileStorage {
    fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.len;
        if data.is_empty() {
            return Ok(offset);
        }
        let file = self.open_file()?;
        file.writer.write_all(data)?;
        file.dirty = true;
        self.len += data.len() as u64;
        Ok(offset)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let size = self.len;
        let end = offset.saturating_add(buf.len() as u64);
        if end > size {
            return Err(Error::OutOfRange { position: offset, length: buf.len(), size });
        }
        if buf.is_empty() {
            return Ok(());
        }

        let file = self.open_file()?;
        if file.dirty {
            file.writer.flush()?;
            file.dirty = false;
        }
        if file.reader_pos != offset {
            file.reader.seek(SeekFrom::Start(offset))?;
        }
        // Invalidate the cached position first so a failed read forces a seek.
        file.reader_pos = u64::MAX;
        file.reader.read_exact(buf)?;
        file.reader_pos = end;
        Ok(())
    }

    fn flush(&mut self, force: bool) -> Result<()> {
        let file = self.open_file()?;
        file.writer.flush()?;
        file.dirty = false;
        if force {
            file.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn truncate(&mut self) -> Result<()> {
        let file = self.open_file()?;
        file.writer.flush()?;
        file.temp.as_file().set_len(0)?;
        file.writer.seek(SeekFrom::Start(0))?;
        file.reader_pos = u64::MAX;
        file.dirty = false;
        self.len = 0;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        let flushed = file.writer.flush();
        let path = file.temp.path().to_path_buf();
        drop(file.reader);
        drop(file.writer);
        file.temp.close()?;
        log::debug!("removed storage file {}", path.display());
        flushed.map_err(Error::from)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

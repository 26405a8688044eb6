use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::PageId;

/// Manages paged file I/O for every storage file the engine touches.
///
/// One descriptor is opened lazily per distinct path and reused for the
/// process lifetime; descriptors are closed only via `close`/`remove` or when
/// the manager is dropped.
pub struct FileManager {
    page_size: usize,
    open_files: HashMap<PathBuf, File>,
}

impl FileManager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            open_files: HashMap::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Open (creating if absent) and cache the descriptor for a path.
    fn open(&mut self, path: &Path) -> FileResult<&mut File> {
        if !self.open_files.contains_key(path) {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?;
            self.open_files.insert(path.to_path_buf(), file);
        }
        Ok(self.open_files.get_mut(path).expect("descriptor was just cached"))
    }

    /// Read page `i` into `buf`. Data past end-of-file reads as zeroes, so a
    /// never-written page comes back as an empty page.
    pub fn read_page(&mut self, path: &Path, i: PageId, buf: &mut [u8]) -> FileResult<()> {
        let page_size = self.page_size;
        if buf.len() != page_size {
            return Err(FileError::InvalidPageSize {
                expected: page_size,
                actual: buf.len(),
            });
        }

        let file = self.open(path)?;
        file.seek(SeekFrom::Start((i * page_size) as u64))?;

        let mut filled = 0;
        while filled < page_size {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf[filled..].fill(0);

        Ok(())
    }

    /// Write page `i` from `buf`; the file grows as needed.
    pub fn write_page(&mut self, path: &Path, i: PageId, buf: &[u8]) -> FileResult<()> {
        let page_size = self.page_size;
        if buf.len() != page_size {
            return Err(FileError::InvalidPageSize {
                expected: page_size,
                actual: buf.len(),
            });
        }

        let file = self.open(path)?;
        file.seek(SeekFrom::Start((i * page_size) as u64))?;
        file.write_all(buf)?;

        Ok(())
    }

    /// Number of pages currently stored in a file (partial trailing pages
    /// count as one).
    pub fn page_count(&mut self, path: &Path) -> FileResult<usize> {
        let page_size = self.page_size;
        let file = self.open(path)?;
        let len = file.metadata()?.len();
        Ok(len.div_ceil(page_size as u64) as usize)
    }

    /// Flush OS buffers for every open file.
    pub fn sync_all(&mut self) -> FileResult<()> {
        for file in self.open_files.values_mut() {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Drop the cached descriptor for a path, if any.
    pub fn close(&mut self, path: &Path) {
        self.open_files.remove(path);
    }

    /// Close and delete a file.
    pub fn remove(&mut self, path: &Path) -> FileResult<()> {
        self.open_files.remove(path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ahash::AHashMap;

use super::error::{FileError, FileResult};
use super::file_manager::FileManager;
use super::page::{Page, PageHandle, PageRef};
use super::PageId;
use crate::catalog::TableRef;

/// The buffer pool: a fixed set of `num_pages` frames of `page_size` bytes,
/// CLOCK eviction with pinning and a second-chance bit, lazily opened
/// per-table descriptors, and a shared temp file backing anonymous pages.
///
/// `BufferManager` is a cheap-clone handle; every reader-writer that needs to
/// allocate pages holds a clone of the one pool the engine owns. Dropping the
/// last clone (and the last `PageHandle`) writes back all dirty pages, closes
/// every descriptor, and deletes the temp file.
pub struct BufferManager {
    core: Rc<RefCell<BufferCore>>,
}

impl BufferManager {
    /// Create a pool of `num_pages` frames of `page_size` bytes, with
    /// anonymous pages spilling to `temp_path`.
    pub fn new(
        page_size: usize,
        num_pages: usize,
        temp_path: impl Into<PathBuf>,
    ) -> FileResult<Self> {
        if page_size == 0 || num_pages == 0 {
            return Err(FileError::InvalidConfig(
                "page size and pool size must be non-zero".into(),
            ));
        }

        let free_frames = (0..num_pages)
            .map(|_| vec![0u8; page_size].into_boxed_slice())
            .collect();

        Ok(Self {
            core: Rc::new(RefCell::new(BufferCore {
                page_size,
                num_pages,
                files: FileManager::new(page_size),
                temp_path: temp_path.into(),
                next_scratch_index: 0,
                page_table: AHashMap::new(),
                clock: vec![None; num_pages],
                clock_hand: 0,
                initialized: false,
                free_frames,
            })),
        })
    }

    pub fn page_size(&self) -> usize {
        self.core.borrow().page_size
    }

    pub fn num_pages(&self) -> usize {
        self.core.borrow().num_pages
    }

    /// Handle to logical page `i` of `table`. If the page is already known, a
    /// handle to the same shared page is returned; no duplicate load ever
    /// happens. No I/O occurs until the handle's bytes are touched.
    pub fn get_page(&self, table: &TableRef, i: PageId) -> FileResult<PageHandle> {
        let page = self.core.borrow_mut().named_page(table, i, false);
        Ok(PageHandle::new(page, self.core.clone()))
    }

    /// Like `get_page`, but the page is pinned in RAM until explicitly
    /// unpinned or until every handle to it is gone.
    pub fn get_pinned_page(&self, table: &TableRef, i: PageId) -> FileResult<PageHandle> {
        let page = self.core.borrow_mut().named_page(table, i, true);
        Ok(PageHandle::new(page, self.core.clone()))
    }

    /// A fresh anonymous scratch page, not associated with any table. Each
    /// call creates a new one; scratch pages evicted while referenced are
    /// spilled to the shared temp file and remain readable through their
    /// handle.
    pub fn get_scratch_page(&self) -> FileResult<PageHandle> {
        let page = self.core.borrow_mut().scratch_page(false);
        Ok(PageHandle::new(page, self.core.clone()))
    }

    /// Like `get_scratch_page`, but pinned.
    pub fn get_pinned_scratch_page(&self) -> FileResult<PageHandle> {
        let page = self.core.borrow_mut().scratch_page(true);
        Ok(PageHandle::new(page, self.core.clone()))
    }

    /// Un-pin the page a handle refers to.
    pub fn unpin(&self, handle: &PageHandle) {
        handle.unpin();
    }

    /// Write every dirty resident page back to its file and sync.
    pub fn flush(&self) -> FileResult<()> {
        self.core.borrow_mut().flush()
    }

    /// Forget every buffered page of a table without write-back, close its
    /// descriptor, and delete its storage file. All handles to the table's
    /// pages must have been dropped.
    pub fn kill_table(&self, table: &TableRef) -> FileResult<()> {
        let loc = table.borrow().storage_loc().to_path_buf();
        self.core.borrow_mut().kill_location(&loc)
    }

    /// Number of pages whose bytes currently occupy a frame.
    pub fn resident_pages(&self) -> usize {
        self.core.borrow().resident_pages()
    }
}

impl Clone for BufferManager {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

pub(crate) struct BufferCore {
    page_size: usize,
    num_pages: usize,
    files: FileManager,
    temp_path: PathBuf,
    next_scratch_index: PageId,
    /// (storage path, page index) -> shared page; anonymous pages are never
    /// looked up by identity and live only on the clock and in handles.
    page_table: AHashMap<(PathBuf, PageId), PageRef>,
    /// The clock face: one slot per frame.
    clock: Vec<Option<PageRef>>,
    clock_hand: usize,
    /// Set once the hand has completed a full revolution; from then on,
    /// freshly loaded pages start with their second-chance bit set so they
    /// survive one sweep instead of being evicted right back out.
    initialized: bool,
    /// Frames not currently backing a resident page.
    free_frames: Vec<Box<[u8]>>,
}

impl BufferCore {
    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    fn named_page(&mut self, table: &TableRef, i: PageId, pinned: bool) -> PageRef {
        let loc = table.borrow().storage_loc().to_path_buf();
        let key = (loc, i);

        if let Some(page) = self.page_table.get(&key) {
            let mut p = page.borrow_mut();
            if pinned {
                p.pinned = true;
            }
            if self.initialized {
                p.second_chance = true;
            }
            return page.clone();
        }

        let page = Rc::new(RefCell::new(Page::new(Some(key.0.clone()), i, pinned)));
        self.page_table.insert(key, page.clone());
        page
    }

    fn scratch_page(&mut self, pinned: bool) -> PageRef {
        let index = self.next_scratch_index;
        self.next_scratch_index += 1;
        Rc::new(RefCell::new(Page::new(None, index, pinned)))
    }

    /// Make a page's bytes resident, evicting if needed, and mark its
    /// second-chance bit. Called from `PageHandle::bytes`.
    pub(crate) fn retrieve(&mut self, page: &PageRef) -> FileResult<()> {
        if page.borrow().bytes.is_none() {
            let mut frame = self.claim_frame(page)?;
            let (path, index) = {
                let p = page.borrow();
                (
                    p.location.clone().unwrap_or_else(|| self.temp_path.clone()),
                    p.index,
                )
            };
            self.files.read_page(&path, index, &mut frame)?;
            page.borrow_mut().bytes = Some(frame);
        }
        if self.initialized {
            page.borrow_mut().second_chance = true;
        }
        Ok(())
    }

    /// Hand a frame back to the free list (an anonymous page died).
    pub(crate) fn recycle(&mut self, frame: Box<[u8]>) {
        self.free_frames.push(frame);
    }

    /// CLOCK sweep: find a frame for `page`, install `page` in its slot, and
    /// return the frame's buffer. Empty and stale slots are claimed outright;
    /// pinned pages are skipped; a set second-chance bit buys one more sweep;
    /// otherwise the occupant is written back (if dirty) and evicted. A sweep
    /// longer than `2 * num_pages` steps means every frame is pinned.
    fn claim_frame(&mut self, page: &PageRef) -> FileResult<Box<[u8]>> {
        let mut steps = 0usize;
        let slot = loop {
            if steps > self.num_pages * 2 {
                return Err(FileError::AllFramesPinned(self.num_pages));
            }
            steps += 1;

            let hand = self.clock_hand;
            let claim = match &self.clock[hand] {
                None => true,
                Some(occupant) => {
                    let mut occ = occupant.borrow_mut();
                    if occ.bytes.is_none() {
                        // A dead anonymous page left a stale slot behind.
                        true
                    } else if occ.pinned {
                        false
                    } else if occ.second_chance {
                        occ.second_chance = false;
                        false
                    } else {
                        true
                    }
                }
            };
            if claim {
                break hand;
            }
            self.advance_hand();
        };

        let frame = match self.clock[slot].take() {
            Some(victim) if victim.borrow().bytes.is_some() => {
                self.write_back(&victim)?;
                victim
                    .borrow_mut()
                    .bytes
                    .take()
                    .expect("victim bytes checked above")
            }
            _ => self
                .free_frames
                .pop()
                .expect("an unoccupied slot always has a free frame"),
        };

        self.clock[slot] = Some(page.clone());
        self.clock_hand = slot;
        self.advance_hand();
        Ok(frame)
    }

    fn advance_hand(&mut self) {
        self.clock_hand = (self.clock_hand + 1) % self.num_pages;
        if self.clock_hand == 0 {
            self.initialized = true;
        }
    }

    /// Write a dirty resident page to its backing file (the temp file for
    /// anonymous pages) and clear its dirty flag. The bytes stay resident.
    fn write_back(&mut self, page: &PageRef) -> FileResult<()> {
        let p = page.borrow();
        if !p.dirty {
            return Ok(());
        }
        let Some(bytes) = p.bytes.as_deref() else {
            return Ok(());
        };
        let path = p.location.clone().unwrap_or_else(|| self.temp_path.clone());
        self.files.write_page(&path, p.index, bytes)?;
        drop(p);
        page.borrow_mut().dirty = false;
        Ok(())
    }

    fn flush(&mut self) -> FileResult<()> {
        for slot in 0..self.clock.len() {
            if let Some(page) = self.clock[slot].clone() {
                self.write_back(&page)?;
            }
        }
        self.files.sync_all()?;
        Ok(())
    }

    fn kill_location(&mut self, loc: &Path) -> FileResult<()> {
        let doomed: Vec<(PathBuf, PageId)> = self
            .page_table
            .keys()
            .filter(|(path, _)| path == loc)
            .cloned()
            .collect();
        for key in doomed {
            if let Some(page) = self.page_table.remove(&key)
                && let Some(frame) = page.borrow_mut().bytes.take()
            {
                self.free_frames.push(frame);
            }
        }
        for slot in self.clock.iter_mut() {
            let stale = match slot {
                Some(page) => page.borrow().location.as_deref() == Some(loc),
                None => false,
            };
            if stale {
                *slot = None;
            }
        }
        self.files.remove(loc)
    }

    fn resident_pages(&self) -> usize {
        self.clock
            .iter()
            .flatten()
            .filter(|p| p.borrow().bytes.is_some())
            .count()
    }
}

impl Drop for BufferCore {
    fn drop(&mut self) {
        // Orderly shutdown: flush whatever is dirty, then delete the temp
        // file. Errors here have nowhere to go.
        for slot in 0..self.clock.len() {
            if let Some(page) = self.clock[slot].clone() {
                let _ = self.write_back(&page);
            }
        }
        let _ = self.files.sync_all();
        let _ = std::fs::remove_file(&self.temp_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Table;
    use crate::record::{AttKind, ColumnDef, Schema};
    use tempfile::TempDir;

    fn test_table(dir: &TempDir, name: &str) -> TableRef {
        let schema = Schema::new(vec![ColumnDef::new("id", AttKind::Int)]);
        Table::new(name, dir.path().join(format!("{name}.tbl")), schema)
    }

    fn setup(page_size: usize, num_pages: usize) -> (TempDir, BufferManager) {
        let dir = tempfile::tempdir().unwrap();
        let bm = BufferManager::new(page_size, num_pages, dir.path().join("tmp.dat")).unwrap();
        (dir, bm)
    }

    fn fill(handle: &PageHandle, byte: u8) {
        handle.bytes().unwrap().fill(byte);
        handle.wrote_bytes();
    }

    fn first_byte(handle: &PageHandle) -> u8 {
        handle.bytes().unwrap()[0]
    }

    #[test]
    fn test_identity_sharing() {
        let (dir, bm) = setup(64, 4);
        let table = test_table(&dir, "t");

        let a = bm.get_page(&table, 0).unwrap();
        let b = bm.get_page(&table, 0).unwrap();
        assert!(a.same_page(&b));

        fill(&a, 7);
        assert_eq!(first_byte(&b), 7);
    }

    #[test]
    fn test_capacity_invariant() {
        let (dir, bm) = setup(64, 4);
        let table = test_table(&dir, "t");

        for i in 0..20 {
            let h = bm.get_page(&table, i).unwrap();
            fill(&h, i as u8);
            assert!(bm.resident_pages() <= 4);
        }
    }

    #[test]
    fn test_write_back_on_eviction() {
        let (dir, bm) = setup(64, 4);
        let table = test_table(&dir, "t");

        {
            let h = bm.get_page(&table, 0).unwrap();
            fill(&h, 0xAB);
        }

        // Touch enough distinct pages to force page 0 out.
        for i in 1..10 {
            let h = bm.get_page(&table, i).unwrap();
            let _ = h.bytes().unwrap();
        }

        let h = bm.get_page(&table, 0).unwrap();
        assert!(h.bytes().unwrap().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_pin_exemption() {
        let (dir, bm) = setup(64, 3);
        let table = test_table(&dir, "t");

        let pinned = bm.get_pinned_page(&table, 0).unwrap();
        fill(&pinned, 0x5A);

        for i in 1..12 {
            let h = bm.get_page(&table, i).unwrap();
            let _ = h.bytes().unwrap();
        }
        assert!(pinned.is_resident());
        assert!(pinned.is_pinned());

        bm.unpin(&pinned);
        for i in 12..20 {
            let h = bm.get_page(&table, i).unwrap();
            let _ = h.bytes().unwrap();
        }
        assert!(!pinned.is_resident());
        assert!(pinned.bytes().unwrap().iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_all_frames_pinned_is_fatal() {
        let (dir, bm) = setup(64, 2);
        let table = test_table(&dir, "t");

        let _a = bm.get_pinned_page(&table, 0).unwrap();
        let _b = bm.get_pinned_page(&table, 1).unwrap();
        let _ = _a.bytes().unwrap();
        let _ = _b.bytes().unwrap();

        let c = bm.get_page(&table, 2).unwrap();
        assert!(matches!(c.bytes(), Err(FileError::AllFramesPinned(2))));
    }

    #[test]
    fn test_scratch_page_survives_eviction() {
        let (dir, bm) = setup(64, 2);
        let table = test_table(&dir, "t");

        let scratch = bm.get_scratch_page().unwrap();
        fill(&scratch, 0xEE);

        for i in 0..6 {
            let h = bm.get_page(&table, i).unwrap();
            let _ = h.bytes().unwrap();
        }
        assert!(!scratch.is_resident());

        // Spilled to the temp file; still readable through the handle.
        assert!(scratch.bytes().unwrap().iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_scratch_pages_are_always_fresh() {
        let (_dir, bm) = setup(64, 4);
        let a = bm.get_scratch_page().unwrap();
        let b = bm.get_scratch_page().unwrap();
        assert!(!a.same_page(&b));
        assert_ne!(a.page_index(), b.page_index());
    }

    #[test]
    fn test_scratch_frame_recycled_on_last_release() {
        let (_dir, bm) = setup(64, 2);

        {
            let s = bm.get_scratch_page().unwrap();
            fill(&s, 1);
            assert_eq!(bm.resident_pages(), 1);
        }
        assert_eq!(bm.resident_pages(), 0);
    }

    #[test]
    fn test_pinned_pages_content_preserved() {
        // Scenario A: 16 frames, 64-byte pages, 10 pinned pages with distinct
        // patterns, released, then re-read unpinned.
        let (dir, bm) = setup(64, 16);
        let table = test_table(&dir, "t");

        let mut handles = Vec::new();
        for i in 0..10 {
            let h = bm.get_pinned_page(&table, i).unwrap();
            fill(&h, b'0' + i as u8);
            handles.push(h);
            assert!(bm.resident_pages() <= 16);
        }
        drop(handles);

        for i in 0..10 {
            let h = bm.get_page(&table, i).unwrap();
            assert!(!h.is_pinned());
            assert!(h.bytes().unwrap().iter().all(|&b| b == b'0' + i as u8));
        }
    }

    #[test]
    fn test_drop_flushes_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let temp_path = dir.path().join("tmp.dat");
        let table = test_table(&dir, "t");

        {
            let bm = BufferManager::new(64, 4, &temp_path).unwrap();
            let h = bm.get_page(&table, 0).unwrap();
            fill(&h, 0x99);
            drop(h);
        }
        assert!(!temp_path.exists());

        let bm = BufferManager::new(64, 4, &temp_path).unwrap();
        let h = bm.get_page(&table, 0).unwrap();
        assert!(h.bytes().unwrap().iter().all(|&b| b == 0x99));
    }

    #[test]
    fn test_kill_table_discards_pages_and_file() {
        let (dir, bm) = setup(64, 4);
        let table = test_table(&dir, "t");

        {
            let h = bm.get_page(&table, 0).unwrap();
            fill(&h, 0x11);
        }
        bm.flush().unwrap();
        assert!(table.borrow().storage_loc().exists());

        bm.kill_table(&table).unwrap();
        assert!(!table.borrow().storage_loc().exists());
        assert_eq!(bm.resident_pages(), 0);
    }
}

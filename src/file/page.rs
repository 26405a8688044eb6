use std::cell::{RefCell, RefMut};
use std::path::PathBuf;
use std::rc::Rc;

use super::buffer_manager::BufferCore;
use super::error::FileResult;
use super::PageId;

pub(crate) type PageRef = Rc<RefCell<Page>>;

/// In-memory state of one logical page.
///
/// A `Page` can outlive its byte buffer: eviction takes the bytes away and the
/// next `PageHandle::bytes` call fetches them back from disk. A page with
/// `location == None` is anonymous scratch space backed by the buffer
/// manager's shared temp file.
pub(crate) struct Page {
    /// Storage file this page belongs to; `None` for anonymous pages.
    pub(crate) location: Option<PathBuf>,
    /// Page index within the storage file (or within the temp file).
    pub(crate) index: PageId,
    /// Resident bytes, exactly one pool frame when present.
    pub(crate) bytes: Option<Box<[u8]>>,
    /// Modified since last written to disk.
    pub(crate) dirty: bool,
    /// Exempt from eviction while set.
    pub(crate) pinned: bool,
    /// CLOCK second-chance bit.
    pub(crate) second_chance: bool,
    /// Count of outstanding `PageHandle`s.
    pub(crate) refs: usize,
}

impl Page {
    pub(crate) fn new(location: Option<PathBuf>, index: PageId, pinned: bool) -> Self {
        Self {
            location,
            index,
            bytes: None,
            dirty: false,
            pinned,
            second_chance: false,
            refs: 0,
        }
    }

    pub(crate) fn is_anonymous(&self) -> bool {
        self.location.is_none()
    }
}

/// Reference-counted accessor to a shared page.
///
/// Construction (and `Clone`) increments the page's handle count; `Drop`
/// decrements it. When the count reaches zero the page is unpinned, and an
/// anonymous page's bytes are abandoned (scratch pages are never read again
/// once the last handle disappears).
pub struct PageHandle {
    page: PageRef,
    core: Rc<RefCell<BufferCore>>,
}

impl PageHandle {
    pub(crate) fn new(page: PageRef, core: Rc<RefCell<BufferCore>>) -> Self {
        page.borrow_mut().refs += 1;
        Self { page, core }
    }

    /// Access the page's bytes, fetching them from disk if they are not
    /// resident. This is the sole trigger for lazy materialization: merely
    /// holding a handle performs no I/O.
    ///
    /// The returned guard must be dropped before any other buffer-manager
    /// call that could evict this page; holding it across one panics.
    pub fn bytes(&self) -> FileResult<RefMut<'_, [u8]>> {
        self.core.borrow_mut().retrieve(&self.page)?;
        Ok(RefMut::map(self.page.borrow_mut(), |p| {
            p.bytes.as_deref_mut().expect("page was just retrieved")
        }))
    }

    /// Must be called after any mutation through `bytes()`; without it the
    /// page is never marked dirty and the mutation is lost on eviction.
    pub fn wrote_bytes(&self) {
        self.page.borrow_mut().dirty = true;
    }

    /// Clear the pinned flag, making the page eligible for eviction again.
    pub fn unpin(&self) {
        self.page.borrow_mut().pinned = false;
    }

    pub fn is_pinned(&self) -> bool {
        self.page.borrow().pinned
    }

    /// True while the page's bytes occupy a pool frame.
    pub fn is_resident(&self) -> bool {
        self.page.borrow().bytes.is_some()
    }

    pub fn page_index(&self) -> PageId {
        self.page.borrow().index
    }

    pub fn page_size(&self) -> usize {
        self.core.borrow().page_size()
    }

    /// True when both handles refer to the same underlying page.
    pub fn same_page(&self, other: &PageHandle) -> bool {
        Rc::ptr_eq(&self.page, &other.page)
    }
}

impl Clone for PageHandle {
    fn clone(&self) -> Self {
        Self::new(self.page.clone(), self.core.clone())
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        let freed = {
            let mut page = self.page.borrow_mut();
            page.refs -= 1;
            if page.refs == 0 {
                page.pinned = false;
                if page.is_anonymous() {
                    // Scratch page dying: no write-back, just hand the frame
                    // back. The clock slot it occupied self-heals on the next
                    // sweep (empty bytes mean the slot is free to claim).
                    page.second_chance = false;
                    page.dirty = false;
                    page.bytes.take()
                } else {
                    None
                }
            } else {
                None
            }
        };
        if let Some(frame) = freed {
            self.core.borrow_mut().recycle(frame);
        }
    }
}

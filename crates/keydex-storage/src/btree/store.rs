//! In-memory node storage used while an index is being built.

use super::constants::FIRST_NODE_PAGE;
use keydex_common::page::PAGE_SIZE;

/// In-memory page storage for B+Tree nodes.
///
/// Nodes are stored in a Vec while building; page `n` lives at index
/// `n - FIRST_NODE_PAGE` because page 0 of the file is the store header.
pub struct NodeStore {
    /// Node pages in page-number order.
    pages: Vec<Box<[u8; PAGE_SIZE]>>,
}

impl NodeStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    /// Allocates a zeroed page and returns its page number.
    #[inline]
    pub fn allocate(&mut self) -> u32 {
        let page_num = self.pages.len() as u32 + FIRST_NODE_PAGE;
        self.pages.push(Box::new([0u8; PAGE_SIZE]));
        page_num
    }

    /// Gets a page by page number (read-only).
    #[inline]
    pub fn get(&self, page_num: u32) -> Option<&[u8; PAGE_SIZE]> {
        let slot = page_num.checked_sub(FIRST_NODE_PAGE)?;
        self.pages.get(slot as usize).map(|p| &**p)
    }

    /// Writes page data at a specific page number.
    #[inline]
    pub fn write(&mut self, page_num: u32, data: &[u8; PAGE_SIZE]) {
        let Some(slot) = page_num.checked_sub(FIRST_NODE_PAGE) else {
            return;
        };
        if let Some(page) = self.pages.get_mut(slot as usize) {
            page.copy_from_slice(data);
        }
    }

    /// Returns the number of node pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Iterates pages with their page numbers.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8; PAGE_SIZE])> {
        self.pages
            .iter()
            .enumerate()
            .map(|(slot, page)| (slot as u32 + FIRST_NODE_PAGE, &**page))
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

//! B+Tree constants for index stores.

use keydex_common::page::{NodeHeader, PAGE_SIZE};

/// Maximum key width in bytes.
pub const MAX_KEY_SIZE: usize = 240;

/// Size of a record pointer stored next to each leaf key.
pub(crate) const POINTER_SIZE: usize = 4;

/// Size of a child page number stored in internal nodes.
pub(crate) const CHILD_SIZE: usize = 4;

/// Page holding the index store header.
pub(crate) const HEADER_PAGE: u32 = 0;

/// First page holding a tree node.
pub(crate) const FIRST_NODE_PAGE: u32 = 1;

/// Maximum tree height. With 240-byte keys a node still fans out 16 ways,
/// so this bounds far more entries than any index may hold.
pub(crate) const MAX_HEIGHT: usize = 16;

/// Usable bytes of a node page after the node header.
pub(crate) const NODE_BODY_SIZE: usize = PAGE_SIZE - NodeHeader::SIZE;

/// Page shift value (12 bits) for 4KB pages
pub const PAGE_SHIFT: usize = 12;
/// Standard page size (4096 bytes)
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Number of slots tracked by a [`PageField`](crate::PageField)
pub const TOTAL_SLOTS: usize = 256;

/// Default bound on attempts made by a single secure allocation
pub const MAX_SECURE_ALLOC_TRIES: usize = TOTAL_SLOTS << PAGE_SHIFT;

/// Memory size representation supporting common units.
///
/// All units use binary (base-2) multipliers (1 KB = 1024 bytes).
///
/// # Examples
///
/// ```
/// use nvsec_core::util::Size;
///
/// let size = Size::MB(4);
/// assert_eq!(size.bytes(), 4 * 1024 * 1024);
/// assert_eq!(size.pages(), 1024);
/// ```
#[derive(Clone, Copy, Debug)]
pub enum Size {
    /// Size in bytes
    B(usize),
    /// Size in kilobytes (1 KB = 1024 bytes)
    KB(usize),
    /// Size in megabytes (1 MB = 1024 KB)
    MB(usize),
    /// Size in gigabytes (1 GB = 1024 MB)
    GB(usize),
}

impl Size {
    /// Converts this size to bytes.
    pub const fn bytes(&self) -> usize {
        match self {
            Size::B(bytes) => *bytes,
            Size::KB(kb) => *kb * (1 << 10),
            Size::MB(mb) => *mb * (1 << 20),
            Size::GB(gb) => *gb * (1 << 30),
        }
    }

    /// Converts this size to bytes, or `None` if the result does not fit into `usize`.
    pub const fn checked_bytes(&self) -> Option<usize> {
        match self {
            Size::B(bytes) => Some(*bytes),
            Size::KB(kb) => kb.checked_mul(1 << 10),
            Size::MB(mb) => mb.checked_mul(1 << 20),
            Size::GB(gb) => gb.checked_mul(1 << 30),
        }
    }

    /// Number of whole 4KB pages covered by this size.
    pub const fn pages(&self) -> usize {
        self.bytes() >> super::PAGE_SHIFT
    }
}

impl PartialEq for Size {
    fn eq(&self, other: &Self) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for Size {}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Size::B(bytes) => write!(f, "{} B", bytes),
            Size::KB(kb) => write!(f, "{} KB", kb),
            Size::MB(mb) => write!(f, "{} MB", mb),
            Size::GB(gb) => write!(f, "{} GB", gb),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::util::Size;

    #[test]
    fn size_conversions() {
        assert_eq!(Size::B(12).bytes(), 12);
        assert_eq!(Size::KB(4).bytes(), 4096);
        assert_eq!(Size::MB(12).bytes(), 12 * (1 << 20));
        assert_eq!(Size::GB(1).pages(), 1 << 18);
    }

    #[test]
    fn size_checked_overflow() {
        assert_eq!(Size::GB(3).checked_bytes(), Some(3 * (1 << 30)));
        assert_eq!(Size::B(usize::MAX).checked_bytes(), Some(usize::MAX));
        assert_eq!(Size::GB(usize::MAX >> 20).checked_bytes(), None);
        assert_eq!(Size::KB(usize::MAX).checked_bytes(), None);
    }

    #[test]
    fn size_equality_across_units() {
        assert_eq!(Size::KB(1024), Size::MB(1));
        assert_ne!(Size::B(4095), Size::KB(4));
        assert_eq!(Size::MB(2).to_string(), "2 MB");
    }
}

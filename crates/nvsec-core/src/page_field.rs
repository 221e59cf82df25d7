//! Bit-field of secure page slots.
//!
//! A placement is quantized to its page index (`offset >> PAGE_SHIFT`) and the
//! page index is reduced modulo [`TOTAL_SLOTS`] to find the owning slot. A
//! [`PageField`] marks a subset of these slots as secure.

use crate::error::ConfigurationError;
use crate::util::{PAGE_SHIFT, TOTAL_SLOTS};
use itertools::Itertools;
use log::debug;
use rand::Rng;
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Range;

const WORD_BITS: usize = u64::BITS as usize;
const WORDS: usize = TOTAL_SLOTS / WORD_BITS;

/// Immutable set of secure slots.
///
/// Every constructor rejects an empty slot set, so a `PageField` obtained from
/// the public API always accepts at least one placement. The field is `Copy`
/// and can be shared freely between concurrent secure allocations.
///
/// # Examples
///
/// ```
/// use nvsec_core::PageField;
///
/// let field = PageField::from_range(150, 160)?;
/// assert!(field.is_secure(150 * 4096));
/// assert!(!field.is_secure(149 * 4096));
/// // page 406 maps to slot 406 % 256 = 150
/// assert!(field.is_secure(406 * 4096 + 17));
/// # Ok::<(), nvsec_core::ConfigurationError>(())
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageField {
    fields: [u64; WORDS],
}

impl PageField {
    /// Creates a field with the lower half of the slot space, `[0, TOTAL_SLOTS / 2)`, secure.
    pub fn new() -> Self {
        let mut field = Self::empty();
        field.set_fields(0, TOTAL_SLOTS / 2);
        field
    }

    /// Creates a field with the slots `[begin, end)` secure.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRange`] if `begin > end`, `end > TOTAL_SLOTS`
    /// or the range is empty.
    pub fn from_range(begin: usize, end: usize) -> Result<Self, ConfigurationError> {
        if begin >= end || end > TOTAL_SLOTS {
            return Err(ConfigurationError::InvalidRange { begin, end });
        }
        let mut field = Self::empty();
        field.set_fields(begin, end);
        debug!("Page field with secure slots [{}, {})", begin, end);
        Ok(field)
    }

    /// Creates a field from an explicit set of secure slots.
    ///
    /// Duplicate slots are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::SlotOutOfRange`] for a slot index `>= TOTAL_SLOTS`
    /// and [`ConfigurationError::EmptyField`] if no slot was given.
    pub fn from_slots<I: IntoIterator<Item = usize>>(slots: I) -> Result<Self, ConfigurationError> {
        let mut field = Self::empty();
        for slot in slots {
            if slot >= TOTAL_SLOTS {
                return Err(ConfigurationError::SlotOutOfRange(slot));
            }
            field.set(slot);
        }
        field.validate()?;
        Ok(field)
    }

    /// Creates a field with `count` distinct secure slots chosen uniformly at random.
    ///
    /// Pass a seeded [`Rng`](crate::util::Rng) to make the choice reproducible.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSlotCount`] unless `1 <= count <= TOTAL_SLOTS`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Result<Self, ConfigurationError> {
        if count == 0 || count > TOTAL_SLOTS {
            return Err(ConfigurationError::InvalidSlotCount(count));
        }
        let mut field = Self::empty();
        for slot in rand::seq::index::sample(rng, TOTAL_SLOTS, count) {
            field.set(slot);
        }
        debug!("Random page field: {:?}", field);
        Ok(field)
    }

    pub(crate) const fn empty() -> Self {
        PageField {
            fields: [0; WORDS],
        }
    }

    /// Returns the slot owning `offset`.
    pub const fn slot_of(offset: u64) -> usize {
        ((offset >> PAGE_SHIFT) % TOTAL_SLOTS as u64) as usize
    }

    /// Returns `true` if the page containing `offset` falls into a secure slot.
    pub fn is_secure(&self, offset: u64) -> bool {
        self.contains_slot(Self::slot_of(offset))
    }

    /// Returns `true` if `slot` is marked secure. Slots outside the field are never secure.
    pub fn contains_slot(&self, slot: usize) -> bool {
        slot < TOTAL_SLOTS && self.fields[slot / WORD_BITS] & (1 << (slot % WORD_BITS)) != 0
    }

    /// Number of secure slots.
    pub fn secure_slots(&self) -> usize {
        self.fields.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Checks that at least one slot is secure.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyField`] otherwise.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.secure_slots() == 0 {
            return Err(ConfigurationError::EmptyField);
        }
        Ok(())
    }

    /// Iterates over the secure slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..TOTAL_SLOTS).filter(|slot| self.contains_slot(*slot))
    }

    /// Secure slots coalesced into ascending half-open ranges.
    pub fn secure_ranges(&self) -> Vec<Range<usize>> {
        self.iter()
            .map(|slot| slot..slot + 1)
            .coalesce(|a, b| {
                if a.end == b.start {
                    Ok(a.start..b.end)
                } else {
                    Err((a, b))
                }
            })
            .collect()
    }

    fn set(&mut self, slot: usize) {
        self.fields[slot / WORD_BITS] |= 1 << (slot % WORD_BITS);
    }

    /// Set fields [beg, end) to 1
    fn set_fields(&mut self, beg: usize, end: usize) {
        for slot in beg..end {
            self.set(slot);
        }
    }
}

impl Default for PageField {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.secure_ranges()).finish()
    }
}

/// Serialized as the list of secure `[start, end)` ranges.
impl Serialize for PageField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.secure_ranges().iter().map(|r| (r.start, r.end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{PAGE_SIZE, Rng};

    #[test]
    fn test_default_half() {
        let field = PageField::default();
        assert_eq!(field.secure_slots(), TOTAL_SLOTS / 2);
        for page in 0..(4 * TOTAL_SLOTS as u64) {
            let offset = page << PAGE_SHIFT;
            let expected = page % (TOTAL_SLOTS as u64) < 128;
            assert_eq!(field.is_secure(offset), expected, "page {}", page);
        }
    }

    #[test]
    fn test_quantization() {
        let field = PageField::from_range(150, 160).unwrap();
        let period = (TOTAL_SLOTS << PAGE_SHIFT) as u64;
        for offset in [0u64, 5000, 150 * 4096, 159 * 4096 + 4095, 160 * 4096, 0xdead_beef] {
            let secure = field.is_secure(offset);
            // same page, any byte
            assert_eq!(field.is_secure(offset & !(PAGE_SIZE as u64 - 1)), secure);
            // same slot, later period
            assert_eq!(field.is_secure(offset + 3 * period), secure);
        }
    }

    #[test]
    fn test_range_membership() {
        let field = PageField::from_range(150, 160).unwrap();
        for slot in 0..TOTAL_SLOTS {
            let offset = (slot << PAGE_SHIFT) as u64 + 123;
            assert_eq!(field.is_secure(offset), (150..160).contains(&slot));
        }
        assert_eq!(field.secure_ranges(), vec![150..160]);
        assert_eq!(PageField::slot_of(150 * 4096), 150);
        assert_eq!(PageField::slot_of((256 + 3) * 4096), 3);
    }

    #[test]
    fn test_full_range() {
        let field = PageField::from_range(0, TOTAL_SLOTS).unwrap();
        assert_eq!(field.secure_slots(), TOTAL_SLOTS);
        assert!(field.is_secure(u64::MAX));
    }

    #[test]
    fn test_invalid_range() {
        assert_eq!(
            PageField::from_range(10, 5),
            Err(ConfigurationError::InvalidRange { begin: 10, end: 5 })
        );
        assert_eq!(
            PageField::from_range(0, TOTAL_SLOTS + 1),
            Err(ConfigurationError::InvalidRange {
                begin: 0,
                end: TOTAL_SLOTS + 1
            })
        );
        assert!(PageField::from_range(7, 7).is_err());
    }

    #[test]
    fn test_from_slots() {
        let field = PageField::from_slots([3, 4, 5, 64, 200, 4]).unwrap();
        assert_eq!(field.secure_slots(), 5);
        assert_eq!(field.secure_ranges(), vec![3..6, 64..65, 200..201]);
        assert!(field.contains_slot(64));
        assert!(!field.contains_slot(63));
        assert!(!field.contains_slot(TOTAL_SLOTS));
        assert_eq!(
            PageField::from_slots([1, 256]),
            Err(ConfigurationError::SlotOutOfRange(256))
        );
        assert_eq!(
            PageField::from_slots(std::iter::empty()),
            Err(ConfigurationError::EmptyField)
        );
    }

    #[test]
    fn test_random() {
        let mut rng = Rng::from_seed(0x42);
        let field = PageField::random(&mut rng, 32).unwrap();
        assert_eq!(field.secure_slots(), 32);
        let again = PageField::random(&mut Rng::from_seed(0x42), 32).unwrap();
        assert_eq!(field, again, "same seed should pick the same slots");
        assert_eq!(
            PageField::random(&mut rng, 0),
            Err(ConfigurationError::InvalidSlotCount(0))
        );
        assert_eq!(
            PageField::random(&mut rng, TOTAL_SLOTS + 1),
            Err(ConfigurationError::InvalidSlotCount(TOTAL_SLOTS + 1))
        );
        let all = PageField::random(&mut rng, TOTAL_SLOTS).unwrap();
        assert_eq!(all, PageField::from_range(0, TOTAL_SLOTS).unwrap());
    }

    #[test]
    fn test_empty_is_invalid() {
        assert_eq!(
            PageField::empty().validate(),
            Err(ConfigurationError::EmptyField)
        );
        assert!(PageField::new().validate().is_ok());
    }

    #[test]
    fn test_debug_and_serialize() {
        let field = PageField::from_slots([0, 1, 2, 10]).unwrap();
        assert_eq!(format!("{:?}", field), "{0..3, 10..11}");
        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(json, "[[0,3],[10,11]]");
    }
}

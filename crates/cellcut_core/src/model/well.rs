//! 96-well plate positions and the free-slot bitset.
//!
//! # Invariants
//! - A `WellId` always names one of the 96 positions `A01`..`H12`.
//! - Slot order is column-major: `A01, B01, .. H01, A02, .. H12`. Auto
//!   assignment always takes the lowest free slot in this order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const PLATE_ROWS: u8 = 8;
pub const PLATE_COLUMNS: u8 = 12;
pub const WELL_COUNT: usize = (PLATE_ROWS as usize) * (PLATE_COLUMNS as usize);

const ROW_LETTERS: &[u8; 8] = b"ABCDEFGH";
const ALL_SLOTS_MASK: u128 = (1u128 << WELL_COUNT) - 1;

static WELL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-H])(0[1-9]|1[0-2])$").expect("well pattern is a valid regex")
});

/// One microplate position, stored as its slot in assignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WellId(u8);

impl WellId {
    /// Builds a well from its slot in assignment order (`0` = `A01`).
    pub fn from_slot(slot: usize) -> Option<Self> {
        if slot < WELL_COUNT {
            Some(Self(slot as u8))
        } else {
            None
        }
    }

    /// Builds a well from a zero-based row (`A` = 0) and one-based column.
    pub fn from_row_column(row: u8, column: u8) -> Option<Self> {
        if row >= PLATE_ROWS || column == 0 || column > PLATE_COLUMNS {
            return None;
        }
        Some(Self((column - 1) * PLATE_ROWS + row))
    }

    pub fn slot(self) -> usize {
        usize::from(self.0)
    }

    pub fn row_letter(self) -> char {
        char::from(ROW_LETTERS[usize::from(self.0 % PLATE_ROWS)])
    }

    pub fn column(self) -> u8 {
        self.0 / PLATE_ROWS + 1
    }

    /// Iterates all 96 wells in assignment order.
    pub fn all() -> impl Iterator<Item = WellId> {
        (0..WELL_COUNT as u8).map(WellId)
    }
}

impl Display for WellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02}", self.row_letter(), self.column())
    }
}

/// Rejected well label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidWell(pub String);

impl Display for InvalidWell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid well `{}` (expected A01..H12)", self.0)
    }
}

impl std::error::Error for InvalidWell {}

impl FromStr for WellId {
    type Err = InvalidWell;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        let captures = WELL_PATTERN
            .captures(&normalized)
            .ok_or_else(|| InvalidWell(value.to_string()))?;
        let row = captures[1].as_bytes()[0] - b'A';
        let column: u8 = captures[2]
            .parse()
            .map_err(|_| InvalidWell(value.to_string()))?;
        WellId::from_row_column(row, column).ok_or_else(|| InvalidWell(value.to_string()))
    }
}

impl Serialize for WellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Claimed-slot bitset over the 96 wells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WellSet {
    bits: u128,
}

impl WellSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, well: WellId) -> bool {
        self.bits & (1u128 << well.slot()) != 0
    }

    /// Marks `well` as claimed. Returns `false` if it was already claimed.
    pub fn claim(&mut self, well: WellId) -> bool {
        let already = self.contains(well);
        self.bits |= 1u128 << well.slot();
        !already
    }

    pub fn release(&mut self, well: WellId) {
        self.bits &= !(1u128 << well.slot());
    }

    /// Lowest free slot in assignment order, if any.
    pub fn first_free(&self) -> Option<WellId> {
        let free = !self.bits & ALL_SLOTS_MASK;
        if free == 0 {
            return None;
        }
        WellId::from_slot(free.trailing_zeros() as usize)
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{WellId, WellSet, WELL_COUNT};

    #[test]
    fn slot_order_is_column_major() {
        let labels: Vec<String> = WellId::all().take(10).map(|w| w.to_string()).collect();
        assert_eq!(
            labels,
            vec!["A01", "B01", "C01", "D01", "E01", "F01", "G01", "H01", "A02", "B02"]
        );
        assert_eq!(WellId::all().last().unwrap().to_string(), "H12");
        assert_eq!(WellId::all().count(), WELL_COUNT);
    }

    #[test]
    fn parse_accepts_case_insensitive_labels() {
        let well: WellId = "c07".parse().unwrap();
        assert_eq!(well.to_string(), "C07");
        assert_eq!(well.row_letter(), 'C');
        assert_eq!(well.column(), 7);
    }

    #[test]
    fn parse_rejects_out_of_plate_labels() {
        for bad in ["I01", "A00", "A13", "A1", "", "AA01"] {
            assert!(bad.parse::<WellId>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn first_free_skips_claimed_slots_and_reuses_released() {
        let mut set = WellSet::new();
        let a01 = set.first_free().unwrap();
        assert!(set.claim(a01));
        assert!(!set.claim(a01));
        let b01 = set.first_free().unwrap();
        assert_eq!(b01.to_string(), "B01");
        set.claim(b01);
        set.release(a01);
        assert_eq!(set.first_free(), Some(a01));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn full_plate_has_no_free_slot() {
        let mut set = WellSet::new();
        for well in WellId::all() {
            set.claim(well);
        }
        assert_eq!(set.first_free(), None);
    }
}

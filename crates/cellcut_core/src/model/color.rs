//! Fixed 16-entry selection palette.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Selection colour. Serialized and printed as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteColor {
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Magenta,
    Orange,
    Purple,
    Pink,
    Brown,
    Lime,
    Teal,
    Navy,
    Maroon,
    Olive,
    Gray,
}

pub const PALETTE: [PaletteColor; 16] = [
    PaletteColor::Red,
    PaletteColor::Green,
    PaletteColor::Blue,
    PaletteColor::Yellow,
    PaletteColor::Cyan,
    PaletteColor::Magenta,
    PaletteColor::Orange,
    PaletteColor::Purple,
    PaletteColor::Pink,
    PaletteColor::Brown,
    PaletteColor::Lime,
    PaletteColor::Teal,
    PaletteColor::Navy,
    PaletteColor::Maroon,
    PaletteColor::Olive,
    PaletteColor::Gray,
];

impl PaletteColor {
    /// Position in `PALETTE`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Yellow => "yellow",
            Self::Cyan => "cyan",
            Self::Magenta => "magenta",
            Self::Orange => "orange",
            Self::Purple => "purple",
            Self::Pink => "pink",
            Self::Brown => "brown",
            Self::Lime => "lime",
            Self::Teal => "teal",
            Self::Navy => "navy",
            Self::Maroon => "maroon",
            Self::Olive => "olive",
            Self::Gray => "gray",
        }
    }

    /// Display RGB used by highlighting collaborators.
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Red => (230, 25, 75),
            Self::Green => (60, 180, 75),
            Self::Blue => (0, 130, 200),
            Self::Yellow => (255, 225, 25),
            Self::Cyan => (70, 240, 240),
            Self::Magenta => (240, 50, 230),
            Self::Orange => (245, 130, 48),
            Self::Purple => (145, 30, 180),
            Self::Pink => (250, 190, 212),
            Self::Brown => (170, 110, 40),
            Self::Lime => (210, 245, 60),
            Self::Teal => (0, 128, 128),
            Self::Navy => (0, 0, 128),
            Self::Maroon => (128, 0, 0),
            Self::Olive => (128, 128, 0),
            Self::Gray => (128, 128, 128),
        }
    }
}

impl Display for PaletteColor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejected colour name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownColor(pub String);

impl Display for UnknownColor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown palette color `{}`", self.0)
    }
}

impl std::error::Error for UnknownColor {}

impl FromStr for PaletteColor {
    type Err = UnknownColor;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let normalized = if normalized == "grey" {
            "gray".to_string()
        } else {
            normalized
        };
        PALETTE
            .iter()
            .copied()
            .find(|color| color.name() == normalized)
            .ok_or_else(|| UnknownColor(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{PaletteColor, PALETTE};

    #[test]
    fn palette_index_matches_position() {
        for (position, color) in PALETTE.iter().enumerate() {
            assert_eq!(color.index(), position);
        }
    }

    #[test]
    fn names_parse_back() {
        for color in PALETTE {
            assert_eq!(color.name().parse::<PaletteColor>().unwrap(), color);
        }
        assert_eq!("Grey".parse::<PaletteColor>().unwrap(), PaletteColor::Gray);
        assert!("chartreuse".parse::<PaletteColor>().is_err());
    }
}

//! Tile addressing in the MODIS sinusoidal grid.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Number of tile columns in the global grid.
pub const GRID_COLUMNS: u8 = 36;
/// Number of tile rows in the global grid.
pub const GRID_ROWS: u8 = 18;

/// A cell of the 36x18 global sinusoidal tile grid.
///
/// Ordering is by `h`, then `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TileId {
    h: u8,
    v: u8,
}

impl TileId {
    /// Create a tile id, rejecting indices outside the grid.
    pub fn new(h: i64, v: i64) -> PipelineResult<Self> {
        if !(0..GRID_COLUMNS as i64).contains(&h) || !(0..GRID_ROWS as i64).contains(&v) {
            return Err(PipelineError::invalid_input(format!(
                "tile (h={}, v={}) outside the {}x{} grid",
                h, v, GRID_COLUMNS, GRID_ROWS
            )));
        }
        Ok(Self {
            h: h as u8,
            v: v as u8,
        })
    }

    pub fn h(&self) -> u8 {
        self.h
    }

    pub fn v(&self) -> u8 {
        self.v
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{:02}v{:02}", self.h, self.v)
    }
}

impl FromStr for TileId {
    type Err = PipelineError;

    /// Parse the "hHHvVV" form used in granule names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::invalid_input(format!("invalid tile id '{}'", s));

        let rest = s.strip_prefix('h').ok_or_else(invalid)?;
        let (h, v) = rest.split_once('v').ok_or_else(invalid)?;
        if h.len() != 2 || v.len() != 2 {
            return Err(invalid());
        }
        let h: i64 = h.parse().map_err(|_| invalid())?;
        let v: i64 = v.parse().map_err(|_| invalid())?;
        TileId::new(h, v)
    }
}

impl TryFrom<String> for TileId {
    type Error = PipelineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TileId> for String {
    fn from(tile: TileId) -> Self {
        tile.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_zero_pads() {
        assert_eq!(TileId::new(24, 6).unwrap().to_string(), "h24v06");
        assert_eq!(TileId::new(3, 11).unwrap().to_string(), "h03v11");
    }

    #[test]
    fn test_parse_roundtrip() {
        let tile: TileId = "h24v06".parse().unwrap();
        assert_eq!((tile.h(), tile.v()), (24, 6));
    }

    #[test]
    fn test_rejects_out_of_grid() {
        assert!(TileId::new(36, 0).is_err());
        assert!(TileId::new(0, 18).is_err());
        assert!(TileId::new(-1, 0).is_err());
        assert!("h36v00".parse::<TileId>().is_err());
        assert!("h4v6".parse::<TileId>().is_err());
    }

    #[test]
    fn test_ordering_is_h_then_v() {
        let mut tiles = vec![
            TileId::new(25, 5).unwrap(),
            TileId::new(24, 6).unwrap(),
            TileId::new(24, 5).unwrap(),
        ];
        tiles.sort();
        let names: Vec<String> = tiles.iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["h24v05", "h24v06", "h25v05"]);
    }
}

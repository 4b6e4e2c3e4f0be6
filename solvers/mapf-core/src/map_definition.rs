//! ASCII map loader: grid dimensions, walkability, warehouse anchors and a
//! name -> world-position waypoint lookup, in one `MapDefinition` value.
//!
//! How a map reaches the supervisor (file, RPC, hand-written literal) is out
//! of scope; this loader mirrors the donor project's MovingAI `.map` parser
//! (header lines, then one character per cell) because that is this
//! workspace's existing idiom for pinning a map format, extended with two
//! line kinds the MovingAI format has no use for: named waypoints and
//! warehouse anchors.

use crate::grid::{Cell, Grid, WorldPoint};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("missing header field: {0}")]
    MissingHeader(&'static str),

    #[error("invalid header value for {field}: {value}")]
    InvalidHeader { field: &'static str, value: String },

    #[error("dimension mismatch: expected {expected} rows, got {got}")]
    DimensionMismatch { expected: u32, got: u32 },

    #[error("row {row} width mismatch: expected {expected}, got {got}")]
    RowWidthMismatch { row: u32, expected: u32, got: u32 },

    #[error("waypoint line references unknown name: {0}")]
    MalformedWaypoint(String),

    #[error("anchor line references unknown name: {0}")]
    MalformedAnchor(String),
}

/// Grid dimensions, walkability, warehouse anchors, and a name lookup for
/// route ingestion (spec.md §6's "opaque MapDefinition value").
#[derive(Debug, Clone)]
pub struct MapDefinition {
    grid: Grid,
    anchors: Vec<Cell>,
    waypoints: HashMap<String, WorldPoint>,
}

impl MapDefinition {
    /// Parse a map definition from an ASCII string.
    ///
    /// ```text
    /// height N
    /// width M
    /// map
    /// <N lines of M characters: '.' passable, anything else blocked>
    /// waypoint <name> <x> <y>
    /// anchor <x> <y>
    /// ```
    /// `waypoint`/`anchor` lines are optional and may appear in any order
    /// after the grid body.
    pub fn parse(input: &str) -> Result<Self, MapError> {
        let mut lines = input.lines();

        let mut height: Option<u32> = None;
        let mut width: Option<u32> = None;

        for line in lines.by_ref() {
            let line = line.trim();
            if line.eq_ignore_ascii_case("map") {
                break;
            }
            if let Some(rest) = line.strip_prefix("height ") {
                height = Some(rest.trim().parse().map_err(|_| MapError::InvalidHeader {
                    field: "height",
                    value: rest.to_string(),
                })?);
            } else if let Some(rest) = line.strip_prefix("width ") {
                width = Some(rest.trim().parse().map_err(|_| MapError::InvalidHeader {
                    field: "width",
                    value: rest.to_string(),
                })?);
            }
        }

        let height = height.ok_or(MapError::MissingHeader("height"))?;
        let width = width.ok_or(MapError::MissingHeader("width"))?;

        let mut walkable = Vec::with_capacity((width * height) as usize);
        let mut row_count: u32 = 0;
        let mut trailing = Vec::new();

        for line in lines.by_ref() {
            if row_count >= height {
                trailing.push(line);
                continue;
            }
            let chars: Vec<char> = line.chars().collect();
            if chars.len() != width as usize {
                return Err(MapError::RowWidthMismatch {
                    row: row_count,
                    expected: width,
                    got: chars.len() as u32,
                });
            }
            for ch in chars {
                walkable.push(ch == '.');
            }
            row_count += 1;
        }

        if row_count < height {
            return Err(MapError::DimensionMismatch {
                expected: height,
                got: row_count,
            });
        }

        let grid = Grid::from_walkable(width, height, walkable);
        let mut anchors = Vec::new();
        let mut waypoints = HashMap::new();

        for line in trailing {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("waypoint ") {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let (name, x, y) = match parts.as_slice() {
                    [name, x, y] => (*name, x.parse::<f64>(), y.parse::<f64>()),
                    _ => return Err(MapError::MalformedWaypoint(rest.to_string())),
                };
                let (x, y) = (
                    x.map_err(|_| MapError::MalformedWaypoint(rest.to_string()))?,
                    y.map_err(|_| MapError::MalformedWaypoint(rest.to_string()))?,
                );
                waypoints.insert(name.to_string(), WorldPoint::new(x, y));
            } else if let Some(rest) = line.strip_prefix("anchor ") {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let (x, y) = match parts.as_slice() {
                    [x, y] => (x.parse::<u32>(), y.parse::<u32>()),
                    _ => return Err(MapError::MalformedAnchor(rest.to_string())),
                };
                let (x, y) = (
                    x.map_err(|_| MapError::MalformedAnchor(rest.to_string()))?,
                    y.map_err(|_| MapError::MalformedAnchor(rest.to_string()))?,
                );
                anchors.push(Cell::new(x, y));
            }
        }

        Ok(Self { grid, anchors, waypoints })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn into_grid(self) -> Grid {
        self.grid
    }

    /// Warehouse anchor cells (§3, §4.3 WarehouseExclusion).
    pub fn anchors(&self) -> &[Cell] {
        &self.anchors
    }

    pub fn is_anchor(&self, cell: Cell) -> bool {
        self.anchors.contains(&cell)
    }

    /// Resolve a target name to a world position. `None` for unknown names
    /// (§7 UnknownReference, per-entry skip at the ingestion boundary).
    pub fn lookup(&self, name: &str) -> Option<WorldPoint> {
        self.waypoints.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_MAP: &str = "height 4\nwidth 6\nmap\n@@@@@@\n@....@\n@.@@.@\n@@@@@@\nwaypoint dock_a 4 1\nanchor 4 1\n";

    #[test]
    fn parses_grid_and_waypoints() {
        let map = MapDefinition::parse(SMALL_MAP).expect("parse failed");
        assert_eq!(map.grid().width(), 6);
        assert_eq!(map.grid().height(), 4);
        assert!(!map.grid().is_walkable(Cell::new(0, 0)));
        assert!(map.grid().is_walkable(Cell::new(1, 1)));
        assert_eq!(map.lookup("dock_a"), Some(WorldPoint::new(4.0, 1.0)));
        assert_eq!(map.lookup("missing"), None);
        assert!(map.is_anchor(Cell::new(4, 1)));
    }

    #[test]
    fn missing_header_is_an_error() {
        let bad = "map\n....";
        let err = MapDefinition::parse(bad).unwrap_err();
        assert!(matches!(err, MapError::MissingHeader("height")));
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let bad = "height 2\nwidth 4\nmap\n....\n";
        let err = MapDefinition::parse(bad).unwrap_err();
        assert!(matches!(err, MapError::DimensionMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn row_width_mismatch_is_an_error() {
        let bad = "height 2\nwidth 4\nmap\n...\n....\n";
        let err = MapDefinition::parse(bad).unwrap_err();
        assert!(matches!(err, MapError::RowWidthMismatch { row: 0, expected: 4, got: 3 }));
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GeometryConfig;

// =============================================================================
// Coordinates
// =============================================================================

/// One tile of the play-area grid, 1-based on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GridCoordinate {
    pub col: u32,
    pub row: u32,
}

/// A point in play-area pixel space (origin at the play area's top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelCoordinate {
    pub x: f64,
    pub y: f64,
}

impl PixelCoordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PixelCoordinate) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Rectangle of UI chrome the policy must never touch. Bounds are inclusive
/// and expressed in play-area pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionZone {
    pub name: String,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ExclusionZone {
    pub fn new(name: &str, left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            name: name.to_string(),
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn contains(&self, p: PixelCoordinate) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }
}

// =============================================================================
// Action Space
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GestureKind {
    /// Move the cursor to the cell, then click (click mode).
    MoveClick,
    /// Move only; buttons are separate actions (drag mode).
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Decoded {
    Wait,
    Press,
    Release,
    Gesture {
        cell: GridCoordinate,
        pixel: PixelCoordinate,
        kind: GestureKind,
    },
    /// Target fell inside an exclusion zone; the step is consumed as a no-op.
    Suppressed {
        cell: GridCoordinate,
        pixel: PixelCoordinate,
    },
    /// Index landed in the reserved upper half of the mouse slot range
    /// `[G, 2G)`. Never aliased onto a grid cell.
    Reserved { slot: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionDecodeError {
    #[error("action {action} outside action space [0, {size})")]
    OutOfRange { action: usize, size: usize },
    #[error("mouse slot {slot} outside [0, {limit})")]
    SlotOutOfRange { slot: i64, limit: usize },
    #[error("cell ({col}, {row}) outside grid {grid_width}x{grid_height}")]
    InvalidCell {
        col: u32,
        row: u32,
        grid_width: u32,
        grid_height: u32,
    },
}

/// Number of dedicated button indices preceding the grid in drag mode.
const DRAG_BUTTON_ACTIONS: usize = 2;

#[derive(Debug, Clone)]
pub struct ActionSpace {
    cell_size: f64,
    origin: PixelCoordinate,
    grid_width: u32,
    grid_height: u32,
    drag: bool,
    zones: Vec<ExclusionZone>,
}

impl ActionSpace {
    pub fn new(geometry: &GeometryConfig, drag: bool) -> Self {
        let cell = geometry.cell_size as f64;
        Self {
            cell_size: cell,
            origin: PixelCoordinate::new(geometry.x_min as f64, geometry.y_min as f64),
            grid_width: (geometry.width() as f64 / cell).ceil() as u32,
            grid_height: (geometry.height() as f64 / cell).ceil() as u32,
            drag,
            zones: geometry.exclusion_zones(),
        }
    }

    pub fn grid_width(&self) -> u32 {
        self.grid_width
    }

    pub fn grid_height(&self) -> u32 {
        self.grid_height
    }

    pub fn drag_enabled(&self) -> bool {
        self.drag
    }

    pub fn zones(&self) -> &[ExclusionZone] {
        &self.zones
    }

    /// `G`, the number of grid cells.
    pub fn cells(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }

    pub fn size(&self) -> usize {
        if self.drag {
            self.cells() + 3
        } else {
            self.cells() + 2
        }
    }

    /// First index of the mouse slot range.
    pub fn offset(&self) -> usize {
        if self.drag {
            1 + DRAG_BUTTON_ACTIONS
        } else {
            1
        }
    }

    pub fn decode(&self, action: usize) -> Result<Decoded, ActionDecodeError> {
        let size = self.size();
        if action >= size {
            return Err(ActionDecodeError::OutOfRange { action, size });
        }
        if action == 0 {
            return Ok(Decoded::Wait);
        }
        if self.drag {
            match action {
                1 => return Ok(Decoded::Press),
                2 => return Ok(Decoded::Release),
                _ => {}
            }
        }

        let g = self.cells();
        let m = action as i64 - self.offset() as i64;
        if m < 0 || m >= (g * 2) as i64 {
            return Err(ActionDecodeError::SlotOutOfRange {
                slot: m,
                limit: g * 2,
            });
        }
        let m = m as usize;
        if m >= g {
            return Ok(Decoded::Reserved { slot: m });
        }

        let idx = m % g;
        let cell = GridCoordinate {
            col: (idx % self.grid_width as usize) as u32 + 1,
            row: (idx / self.grid_width as usize) as u32 + 1,
        };
        let pixel = self.cell_to_pixel(cell);
        if self.excluded_by(pixel).is_some() {
            return Ok(Decoded::Suppressed { cell, pixel });
        }
        let kind = if self.drag {
            GestureKind::Move
        } else {
            GestureKind::MoveClick
        };
        Ok(Decoded::Gesture { cell, pixel, kind })
    }

    /// Left inverse of [`decode`](Self::decode) for valid cells; handy for
    /// authoring fixed scripts.
    pub fn encode(&self, col: u32, row: u32) -> Result<usize, ActionDecodeError> {
        if col == 0 || row == 0 || col > self.grid_width || row > self.grid_height {
            return Err(ActionDecodeError::InvalidCell {
                col,
                row,
                grid_width: self.grid_width,
                grid_height: self.grid_height,
            });
        }
        Ok((col as usize - 1) + self.grid_width as usize * (row as usize - 1) + self.offset())
    }

    /// Cell-center convention: `x = col * cell - cell / 2`.
    pub fn cell_to_pixel(&self, cell: GridCoordinate) -> PixelCoordinate {
        PixelCoordinate::new(
            cell.col as f64 * self.cell_size - self.cell_size / 2.0,
            cell.row as f64 * self.cell_size - self.cell_size / 2.0,
        )
    }

    /// Play-area pixel to viewport pixel.
    pub fn to_viewport(&self, p: PixelCoordinate) -> PixelCoordinate {
        p.offset(self.origin.x, self.origin.y)
    }

    pub fn is_excluded(&self, p: PixelCoordinate) -> bool {
        self.excluded_by(p).is_some()
    }

    pub fn excluded_by(&self, p: PixelCoordinate) -> Option<&ExclusionZone> {
        self.zones.iter().find(|z| z.contains(p))
    }
}

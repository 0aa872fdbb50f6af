//! Persistent world map.
//!
//! Two layers live here:
//!
//! - an [`EvidenceGrid`] of per-cell navigable / obstacle observation counts,
//!   incremented on every cycle and never decremented;
//! - a display-grade [`WorldMap`] with three 0–255 channels (obstacle,
//!   sample, navigable) that is only reconciled from the evidence on cycles
//!   where the vehicle is level enough for the flat-ground projection to
//!   hold.
//!
//! Conflicts between the navigable and obstacle channels are resolved by
//! weighted majority: a cell keeps its navigable mark only while
//! `ratio × navigable > obstacle`, and keeps its obstacle mark only while
//! `ratio × navigable < obstacle`.
//!
//! # Example
//!
//! ```rust
//! use rover_perception::transform::GridCell;
//! use rover_perception::world_map::{MapConfig, WorldMapAccumulator};
//!
//! let mut acc = WorldMapAccumulator::new(MapConfig { world_size: 10, ..MapConfig::default() });
//! let cell = GridCell::new(3, 4);
//!
//! assert!(acc.update(&[], &[cell], &[], 0.0, 0.0));
//! assert_eq!(acc.map().cell(cell), [0, 0, 255]);
//!
//! // Tilted frames still count as evidence but leave the display map alone.
//! assert!(!acc.update(&[cell], &[], &[], 5.0, 0.0));
//! assert_eq!(acc.evidence().obstacle_count(cell), 1);
//! ```

use std::collections::HashSet;

use rover_types::Pose;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transform::GridCell;

/// Navigable observations needed to outweigh one obstacle observation.
pub const DEFAULT_EVIDENCE_RATIO: u32 = 5;

/// Largest roll or pitch, in degrees, at which a frame is mapped.
pub const DEFAULT_MAX_TILT_DEG: f32 = 3.0;

/// Tuning for [`WorldMapAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Side length of the square grid, in cells.
    pub world_size: usize,
    pub evidence_ratio: u32,
    pub max_tilt_deg: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            world_size: 200,
            evidence_ratio: DEFAULT_EVIDENCE_RATIO,
            max_tilt_deg: DEFAULT_MAX_TILT_DEG,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Attitude gate
// ────────────────────────────────────────────────────────────────────────────

/// Fold an angle above 180° into the equivalent negative angle.
pub fn normalize_angle(deg: f32) -> f32 {
    if deg > 180.0 { deg - 360.0 } else { deg }
}

/// True when both roll and pitch are strictly within `max_tilt` degrees of
/// level.
pub fn attitude_is_level(roll: f32, pitch: f32, max_tilt: f32) -> bool {
    normalize_angle(roll).abs() < max_tilt && normalize_angle(pitch).abs() < max_tilt
}

// ────────────────────────────────────────────────────────────────────────────
// Grid
// ────────────────────────────────────────────────────────────────────────────

/// Square, row-major grid indexed by [`GridCell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    size: usize,
    cells: Vec<T>,
}

impl<T: Copy + Default> Grid<T> {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![T::default(); size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Value at `cell`; `T::default()` outside the grid.
    pub fn get(&self, cell: GridCell) -> T {
        self.index(cell).map(|i| self.cells[i]).unwrap_or_default()
    }

    pub fn set(&mut self, cell: GridCell, value: T) {
        if let Some(i) = self.index(cell) {
            self.cells[i] = value;
        }
    }

    pub fn update(&mut self, cell: GridCell, f: impl FnOnce(T) -> T) {
        if let Some(i) = self.index(cell) {
            self.cells[i] = f(self.cells[i]);
        }
    }

    pub fn values(&self) -> &[T] {
        &self.cells
    }

    fn index(&self, cell: GridCell) -> Option<usize> {
        (cell.x < self.size && cell.y < self.size).then(|| cell.y * self.size + cell.x)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// EvidenceGrid / WorldMap
// ────────────────────────────────────────────────────────────────────────────

/// Monotonic per-cell observation counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceGrid {
    navigable: Grid<u32>,
    obstacle: Grid<u32>,
}

impl EvidenceGrid {
    pub fn new(size: usize) -> Self {
        Self {
            navigable: Grid::new(size),
            obstacle: Grid::new(size),
        }
    }

    pub fn navigable_count(&self, cell: GridCell) -> u32 {
        self.navigable.get(cell)
    }

    pub fn obstacle_count(&self, cell: GridCell) -> u32 {
        self.obstacle.get(cell)
    }

    pub fn navigable(&self) -> &Grid<u32> {
        &self.navigable
    }

    pub fn obstacle(&self) -> &Grid<u32> {
        &self.obstacle
    }

    /// Count each distinct cell at most once per call, however many pixels
    /// landed in it.
    fn observe(&mut self, obstacle: &[GridCell], navigable: &[GridCell]) {
        for cell in distinct(obstacle) {
            self.obstacle.update(cell, |n| n.saturating_add(1));
        }
        for cell in distinct(navigable) {
            self.navigable.update(cell, |n| n.saturating_add(1));
        }
    }
}

fn distinct(cells: &[GridCell]) -> HashSet<GridCell> {
    cells.iter().copied().collect()
}

/// Three-channel display map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldMap {
    obstacle: Grid<u8>,
    sample: Grid<u8>,
    navigable: Grid<u8>,
}

impl WorldMap {
    pub fn new(size: usize) -> Self {
        Self {
            obstacle: Grid::new(size),
            sample: Grid::new(size),
            navigable: Grid::new(size),
        }
    }

    pub fn size(&self) -> usize {
        self.navigable.size()
    }

    /// `[obstacle, sample, navigable]` intensities at `cell`.
    pub fn cell(&self, cell: GridCell) -> [u8; 3] {
        [
            self.obstacle.get(cell),
            self.sample.get(cell),
            self.navigable.get(cell),
        ]
    }

    pub fn obstacle(&self) -> &Grid<u8> {
        &self.obstacle
    }

    pub fn sample(&self) -> &Grid<u8> {
        &self.sample
    }

    pub fn navigable(&self) -> &Grid<u8> {
        &self.navigable
    }

    pub fn navigable_cells(&self) -> usize {
        lit(&self.navigable)
    }

    pub fn obstacle_cells(&self) -> usize {
        lit(&self.obstacle)
    }

    pub fn sample_cells(&self) -> usize {
        lit(&self.sample)
    }
}

fn lit(grid: &Grid<u8>) -> usize {
    grid.values().iter().filter(|&&v| v > 0).count()
}

// ────────────────────────────────────────────────────────────────────────────
// Accumulator
// ────────────────────────────────────────────────────────────────────────────

/// Owns the evidence and display grids for the vehicle's lifetime.
#[derive(Debug, Clone)]
pub struct WorldMapAccumulator {
    config: MapConfig,
    evidence: EvidenceGrid,
    map: WorldMap,
}

impl WorldMapAccumulator {
    pub fn new(config: MapConfig) -> Self {
        Self {
            config,
            evidence: EvidenceGrid::new(config.world_size),
            map: WorldMap::new(config.world_size),
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn evidence(&self) -> &EvidenceGrid {
        &self.evidence
    }

    pub fn map(&self) -> &WorldMap {
        &self.map
    }

    /// Fold one cycle of world-grid observations into the map.
    ///
    /// Evidence counts are always incremented.  The display map is only
    /// touched when [`attitude_is_level`] holds for `roll`/`pitch`; the return
    /// value reports whether that happened.
    pub fn update(
        &mut self,
        obstacle: &[GridCell],
        navigable: &[GridCell],
        samples: &[GridCell],
        roll: f32,
        pitch: f32,
    ) -> bool {
        self.evidence.observe(obstacle, navigable);

        if !attitude_is_level(roll, pitch, self.config.max_tilt_deg) {
            debug!(roll, pitch, "tilt gate rejected frame for world map");
            return false;
        }

        for &cell in obstacle {
            self.map.obstacle.set(cell, 255);
        }
        for &cell in navigable {
            self.map.navigable.set(cell, 255);
        }
        self.resolve_conflicts();
        for &cell in samples {
            self.map.obstacle.set(cell, 255);
            self.map.sample.set(cell, 255);
            self.map.navigable.set(cell, 255);
        }
        true
    }

    /// Convenience wrapper taking the attitude from `pose`.
    pub fn update_with_pose(
        &mut self,
        obstacle: &[GridCell],
        navigable: &[GridCell],
        samples: &[GridCell],
        pose: &Pose,
    ) -> bool {
        self.update(obstacle, navigable, samples, pose.roll, pose.pitch)
    }

    fn resolve_conflicts(&mut self) {
        let ratio = u64::from(self.config.evidence_ratio);
        let nav_counts = self.evidence.navigable.values();
        let obs_counts = self.evidence.obstacle.values();
        for (i, (&nav, &obs)) in nav_counts.iter().zip(obs_counts).enumerate() {
            let weighted = ratio * u64::from(nav);
            let obs = u64::from(obs);
            if weighted <= obs {
                self.map.navigable.cells[i] = 0;
            }
            if weighted >= obs {
                self.map.obstacle.cells[i] = 0;
            }
        }
    }
}

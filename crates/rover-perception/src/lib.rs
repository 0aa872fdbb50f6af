//! `rover-perception` – from camera pixels to a persistent world map.
//!
//! # Modules
//!
//! - [`transform`] – perspective warp to a top-down view
//!   ([`project_to_groundplane`][transform::project_to_groundplane]) and the
//!   image → rover → world-grid point transforms.
//! - [`classifier`] – colour-threshold segmentation into navigable, obstacle,
//!   and sample [`Mask`][mask::Mask]s.
//! - [`mask`] – binary per-pixel membership grid.
//! - [`world_map`] – [`WorldMapAccumulator`][world_map::WorldMapAccumulator]:
//!   monotonic evidence counts plus an attitude-gated display map.

pub mod classifier;
pub mod mask;
pub mod transform;
pub mod world_map;

pub use classifier::{ColorThresholds, TerrainMasks, classify};
pub use mask::Mask;
pub use transform::{CameraGeometry, GridCell, PolarSet};
pub use world_map::{MapConfig, WorldMap, WorldMapAccumulator};

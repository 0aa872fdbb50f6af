//! Per-cycle perception: camera frame in, map update and navigable summary out.
//!
//! ```text
//! Frame ─▶ project_to_groundplane ─▶ classify ─▶ to_rover_frame ─┬▶ to_world_grid ─▶ WorldMapAccumulator
//!                                                                └▶ to_polar ─▶ PerceptionOutput::navigable
//! ```

use rover_perception::transform::{
    project_to_groundplane, range_mask, to_polar, to_rover_frame, to_world_grid,
};
use rover_perception::world_map::EvidenceGrid;
use rover_perception::{
    CameraGeometry, ColorThresholds, GridCell, Mask, MapConfig, PolarSet, WorldMap,
    WorldMapAccumulator, classify,
};
use rover_types::{Frame, Pose, RoverError};
use tracing::debug;

/// What one successful perception pass hands to the rest of the cycle.
#[derive(Debug, Clone)]
pub struct PerceptionOutput {
    /// Display overlay of the three terrain masks in top-down view.
    pub overlay: Frame,
    /// Navigable pixels in rover-frame polar form.
    pub navigable: PolarSet,
    /// Number of sample pixels detected.
    pub sample_pixels: usize,
    /// Whether the attitude gate let this frame into the world map.
    pub map_accepted: bool,
}

/// Camera calibration, colour thresholds and the persistent world map.
#[derive(Debug, Clone)]
pub struct PerceptionPipeline {
    geometry: CameraGeometry,
    thresholds: ColorThresholds,
    accumulator: WorldMapAccumulator,
}

impl PerceptionPipeline {
    pub fn new(geometry: CameraGeometry, thresholds: ColorThresholds, map: MapConfig) -> Self {
        Self {
            geometry,
            thresholds,
            accumulator: WorldMapAccumulator::new(map),
        }
    }

    pub fn geometry(&self) -> &CameraGeometry {
        &self.geometry
    }

    pub fn world_map(&self) -> &WorldMap {
        self.accumulator.map()
    }

    pub fn evidence(&self) -> &EvidenceGrid {
        self.accumulator.evidence()
    }

    /// Run one frame through the pipeline and fold it into the world map.
    ///
    /// # Errors
    ///
    /// [`RoverError::DegenerateProjection`] when the camera geometry cannot
    /// define a perspective warp, [`RoverError::MalformedFrame`] for an empty
    /// frame.  The world map is left untouched on error.
    pub fn process(&mut self, frame: &Frame, pose: &Pose) -> Result<PerceptionOutput, RoverError> {
        let (width, height) = (frame.width(), frame.height());
        let src = self.geometry.source_quad();
        let dst = self.geometry.destination_quad(width, height);
        let (warped, field_of_view) = project_to_groundplane(frame, &src, &dst)?;

        let view = self.view_mask(field_of_view)?;
        let masks = classify(&warped, &view, &self.thresholds)?;

        let navigable = to_rover_frame(&masks.navigable);
        let obstacle = to_rover_frame(&masks.obstacle);
        let sample = to_rover_frame(&masks.sample);

        let size = self.accumulator.config().world_size;
        let scale = self.geometry.scale();
        let obstacle_cells: Vec<GridCell> = to_world_grid(&obstacle, pose, size, scale);
        let navigable_cells: Vec<GridCell> = to_world_grid(&navigable, pose, size, scale);
        let sample_cells: Vec<GridCell> = to_world_grid(&sample, pose, size, scale);
        let map_accepted = self.accumulator.update_with_pose(
            &obstacle_cells,
            &navigable_cells,
            &sample_cells,
            pose,
        );

        debug!(
            navigable = navigable.len(),
            obstacle = obstacle.len(),
            sample = sample.len(),
            map_accepted,
            "frame processed"
        );

        Ok(PerceptionOutput {
            overlay: masks.overlay(),
            navigable: to_polar(&navigable),
            sample_pixels: sample.len(),
            map_accepted,
        })
    }

    fn view_mask(&self, field_of_view: Mask) -> Result<Mask, RoverError> {
        match self.geometry.max_range_px {
            Some(radius) => {
                let range = range_mask(field_of_view.width(), field_of_view.height(), radius);
                field_of_view.intersect(&range)
            }
            None => Ok(field_of_view),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUND: [u8; 3] = [200, 190, 180];
    const ROCK: [u8; 3] = [70, 55, 40];

    fn pipeline() -> PerceptionPipeline {
        PerceptionPipeline::new(
            CameraGeometry::default(),
            ColorThresholds::default(),
            MapConfig::default(),
        )
    }

    fn level_pose() -> Pose {
        Pose {
            x: 100.0,
            y: 100.0,
            ..Pose::default()
        }
    }

    #[test]
    fn bright_ground_is_navigable_ahead() {
        let mut p = pipeline();
        let frame = Frame::filled(320, 160, GROUND);
        let out = p.process(&frame, &level_pose()).unwrap();

        assert!(out.navigable.len() > 1000, "n={}", out.navigable.len());
        let mean = out.navigable.mean_angle_deg().unwrap();
        assert!(mean.abs() < 5.0, "mean angle {mean}");
        assert!(out.map_accepted);
        assert!(p.world_map().navigable_cells() > 0);
        assert_eq!(p.world_map().obstacle_cells(), 0);
    }

    #[test]
    fn rock_yields_only_obstacles() {
        let mut p = pipeline();
        let frame = Frame::filled(320, 160, ROCK);
        let out = p.process(&frame, &level_pose()).unwrap();

        assert!(out.navigable.is_empty());
        assert!(p.world_map().obstacle_cells() > 0);
        assert_eq!(p.world_map().navigable_cells(), 0);
        assert_eq!(out.overlay.pixel(160, 150), [255, 0, 0]);
    }

    #[test]
    fn tilted_frame_counts_evidence_but_skips_map() {
        let mut p = pipeline();
        let frame = Frame::filled(320, 160, GROUND);
        let pose = Pose {
            roll: 5.0,
            ..level_pose()
        };
        let out = p.process(&frame, &pose).unwrap();

        assert!(!out.map_accepted);
        assert_eq!(p.world_map().navigable_cells(), 0);
        let counts = p.evidence().navigable().values();
        assert!(counts.iter().all(|&c| c <= 1));
        let touched = counts.iter().filter(|&&c| c == 1).count();
        assert!(touched > 0);
        // Many pixels share a world cell, but each cell counts once.
        assert!(touched < out.navigable.len());
    }

    #[test]
    fn range_limit_shrinks_navigable_set() {
        let frame = Frame::filled(320, 160, GROUND);
        let full = pipeline().process(&frame, &level_pose()).unwrap();

        let geometry = CameraGeometry {
            max_range_px: Some(40.0),
            ..CameraGeometry::default()
        };
        let mut near = PerceptionPipeline::new(geometry, ColorThresholds::default(), MapConfig::default());
        let limited = near.process(&frame, &level_pose()).unwrap();

        assert!(limited.navigable.len() < full.navigable.len());
        assert!(limited.navigable.distances.iter().all(|&d| d < 40.0 + 1.0));
    }

    #[test]
    fn degenerate_geometry_fails_without_touching_map() {
        let geometry = CameraGeometry {
            source: [[0.0, 0.0], [10.0, 10.0], [20.0, 20.0], [30.0, 30.0]],
            ..CameraGeometry::default()
        };
        let mut p = PerceptionPipeline::new(geometry, ColorThresholds::default(), MapConfig::default());
        let frame = Frame::filled(320, 160, GROUND);

        assert!(matches!(
            p.process(&frame, &level_pose()),
            Err(RoverError::DegenerateProjection(_))
        ));
        assert_eq!(p.world_map().navigable_cells(), 0);
        assert!(p.evidence().navigable().values().iter().all(|&c| c == 0));
    }
}

//! Per-camera calibration configuration.
//!
//! Everything here is plain data with factory defaults. The struct is loaded
//! from JSON by the command-line tool and can also be read and written one
//! named scalar at a time for an external persistence layer.

use anyhow::{bail, Result};
use fieldcal_core::{CameraModelKind, Pt2, Real};
use fieldcal_optim::{LmOptions, ObservationCovariance, PinholeFixFlags, SolveOptions};
use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::CalibrationError;

/// Number of operator-placed control points per camera.
pub const NUM_CONTROL_POINTS: usize = 4;

/// Operator-placed correspondence between a pixel and a field position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub name: String,
    pub image: Pt2,
    /// Field position in millimetres, on the `z = 0` plane.
    pub field: Pt2,
}

impl ControlPoint {
    fn default_for(index: usize) -> Self {
        Self {
            name: format!("CP {index}"),
            image: Pt2::new(50.0, 50.0 * (index + 1) as Real),
            field: Pt2::origin(),
        }
    }
}

fn default_control_points() -> [ControlPoint; NUM_CONTROL_POINTS] {
    std::array::from_fn(ControlPoint::default_for)
}

/// Tunables of one camera's calibration.
///
/// `line_search_corridor_width` and `point_separation` are consumed by the
/// external edge detector that produces segment observations; they are
/// carried here so one file configures the whole camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub camera_index: usize,
    pub control_points: [ControlPoint; NUM_CONTROL_POINTS],
    /// Carried for configuration compatibility; not used by the solver. The
    /// quaternion model starts from its current distortion.
    pub initial_distortion: Real,
    /// Width in pixels of the search corridor around projected field lines.
    pub line_search_corridor_width: Real,
    /// Pixels near the image border where harvested corners are rejected.
    pub image_boundary: Real,
    /// Harvested corners further than this from the camera (mm) are rejected.
    pub max_feature_distance: Real,
    /// Wall-clock budget for one quaternion-model solve, in seconds.
    pub convergence_timeout: Real,
    pub cov_corner_x: Real,
    pub cov_corner_y: Real,
    pub cov_ls_x: Real,
    pub cov_ls_y: Real,
    /// Spacing in pixels between sampled segment observations.
    pub point_separation: Real,
    /// Image size in pixels; zero means unknown.
    pub image_width: u32,
    pub image_height: u32,
    /// Slack (mm) outside the field rectangle within which line
    /// intersections are still accepted as corners.
    pub corner_intersection_margin: Real,
    /// Free the camera height slot in the quaternion solver.
    pub estimate_camera_height: bool,
    /// Pinhole intrinsics held fixed during a full pass.
    pub pinhole_fix: PinholeFixFlags,
    pub model: CameraModelKind,
    /// Options for the library solver used by the pinhole model.
    pub library_solver: SolveOptions,
    /// Inner corners per chessboard row.
    pub grid_width: u32,
    /// Inner corners per chessboard column.
    pub grid_height: u32,
    /// A chessboard sample whose mean squared corner offset (px²) to an
    /// accepted sample is below this is dropped as a duplicate.
    pub corner_diff_sq_threshold: Real,
    /// Start the chessboard calibration from the current intrinsics instead
    /// of a closed-form estimate.
    pub use_intrinsic_guess: bool,
    /// Intrinsics held fixed by the chessboard calibration.
    pub intrinsic_fix: PinholeFixFlags,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            control_points: default_control_points(),
            initial_distortion: 1.0,
            line_search_corridor_width: 280.0,
            image_boundary: 10.0,
            max_feature_distance: 20000.0,
            convergence_timeout: 10.0,
            cov_corner_x: 1.0,
            cov_corner_y: 1.0,
            cov_ls_x: 1.0,
            cov_ls_y: 1.0,
            point_separation: 150.0,
            image_width: 0,
            image_height: 0,
            corner_intersection_margin: 250.0,
            estimate_camera_height: false,
            pinhole_fix: PinholeFixFlags {
                fix_principal_point: true,
                fix_tangential_distortion: true,
                fix_k3: true,
                ..PinholeFixFlags::default()
            },
            model: CameraModelKind::default(),
            library_solver: SolveOptions::default(),
            grid_width: 9,
            grid_height: 6,
            corner_diff_sq_threshold: 500.0,
            use_intrinsic_guess: false,
            intrinsic_fix: PinholeFixFlags {
                fix_tangential_distortion: true,
                ..PinholeFixFlags::default()
            },
        }
    }
}

impl CalibrationConfig {
    pub fn for_camera(camera_index: usize) -> Self {
        Self {
            camera_index,
            ..Self::default()
        }
    }

    pub fn covariance(&self) -> ObservationCovariance {
        ObservationCovariance {
            corner_x: self.cov_corner_x,
            corner_y: self.cov_corner_y,
            segment_x: self.cov_ls_x,
            segment_y: self.cov_ls_y,
        }
    }

    /// Damped solver options with the configured timeout.
    pub fn lm_options(&self) -> LmOptions {
        LmOptions {
            timeout_s: self.convergence_timeout,
            ..LmOptions::default()
        }
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.covariance()
            .validate()
            .map_err(|e| CalibrationError::InvalidConfig(e.to_string()))?;
        if !(self.convergence_timeout.is_finite() && self.convergence_timeout >= 0.0) {
            return Err(CalibrationError::InvalidConfig(format!(
                "convergence timeout must be non-negative, got {}",
                self.convergence_timeout
            )));
        }
        if self.image_boundary < 0.0 || self.corner_intersection_margin < 0.0 {
            return Err(CalibrationError::InvalidConfig(
                "image boundary and intersection margin must be non-negative".into(),
            ));
        }
        if self.grid_width < 2 || self.grid_height < 2 {
            return Err(CalibrationError::InvalidConfig(format!(
                "chessboard grid must be at least 2x2, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if !(self.corner_diff_sq_threshold.is_finite() && self.corner_diff_sq_threshold >= 0.0) {
            return Err(CalibrationError::InvalidConfig(format!(
                "duplicate sample threshold must be non-negative, got {}",
                self.corner_diff_sq_threshold
            )));
        }
        Ok(())
    }

    /// Image centre when the image size is known.
    pub fn image_center(&self) -> Option<Pt2> {
        (self.image_width > 0 && self.image_height > 0).then(|| {
            Pt2::new(
                0.5 * self.image_width as Real,
                0.5 * self.image_height as Real,
            )
        })
    }

    /// Move the control points' field positions to the corners of this
    /// camera's share of the field. Returns `false` (and leaves the points
    /// alone) for unsupported camera counts.
    pub fn update_control_points(
        &mut self,
        num_cameras: usize,
        field_length: Real,
        field_width: Real,
    ) -> bool {
        let generated = generate_camera_control_points(
            self.camera_index,
            num_cameras,
            field_length,
            field_width,
        );
        if generated.len() != NUM_CONTROL_POINTS {
            return false;
        }
        for (cp, field) in self.control_points.iter_mut().zip(generated) {
            cp.field = field;
        }
        true
    }

    /// Configuration as named scalars, in a stable order.
    pub fn scalars(&self) -> Vec<(String, Real)> {
        let mut out = vec![
            ("camera_index".to_string(), self.camera_index as Real),
            ("initial_distortion".to_string(), self.initial_distortion),
            (
                "line_search_corridor_width".to_string(),
                self.line_search_corridor_width,
            ),
            ("image_boundary".to_string(), self.image_boundary),
            ("max_feature_distance".to_string(), self.max_feature_distance),
            ("convergence_timeout".to_string(), self.convergence_timeout),
            ("cov_corner_x".to_string(), self.cov_corner_x),
            ("cov_corner_y".to_string(), self.cov_corner_y),
            ("cov_ls_x".to_string(), self.cov_ls_x),
            ("cov_ls_y".to_string(), self.cov_ls_y),
            ("point_separation".to_string(), self.point_separation),
            ("image_width".to_string(), self.image_width as Real),
            ("image_height".to_string(), self.image_height as Real),
            (
                "corner_intersection_margin".to_string(),
                self.corner_intersection_margin,
            ),
            ("grid_width".to_string(), self.grid_width as Real),
            ("grid_height".to_string(), self.grid_height as Real),
            (
                "corner_diff_sq_threshold".to_string(),
                self.corner_diff_sq_threshold,
            ),
        ];
        for (i, cp) in self.control_points.iter().enumerate() {
            out.push((format!("cp{i}_image_x"), cp.image.x));
            out.push((format!("cp{i}_image_y"), cp.image.y));
            out.push((format!("cp{i}_field_x"), cp.field.x));
            out.push((format!("cp{i}_field_y"), cp.field.y));
        }
        out
    }

    pub fn set_scalar(&mut self, name: &str, value: Real) -> Result<()> {
        match name {
            "camera_index" => self.camera_index = non_negative_integer(name, value)? as usize,
            "initial_distortion" => self.initial_distortion = value,
            "line_search_corridor_width" => self.line_search_corridor_width = value,
            "image_boundary" => self.image_boundary = value,
            "max_feature_distance" => self.max_feature_distance = value,
            "convergence_timeout" => self.convergence_timeout = value,
            "cov_corner_x" => self.cov_corner_x = value,
            "cov_corner_y" => self.cov_corner_y = value,
            "cov_ls_x" => self.cov_ls_x = value,
            "cov_ls_y" => self.cov_ls_y = value,
            "point_separation" => self.point_separation = value,
            "image_width" => self.image_width = non_negative_integer(name, value)?,
            "image_height" => self.image_height = non_negative_integer(name, value)?,
            "corner_intersection_margin" => self.corner_intersection_margin = value,
            "grid_width" => self.grid_width = non_negative_integer(name, value)?,
            "grid_height" => self.grid_height = non_negative_integer(name, value)?,
            "corner_diff_sq_threshold" => self.corner_diff_sq_threshold = value,
            _ => return self.set_control_point_scalar(name, value),
        }
        Ok(())
    }

    fn set_control_point_scalar(&mut self, name: &str, value: Real) -> Result<()> {
        let Some(rest) = name.strip_prefix("cp") else {
            bail!("unknown calibration config scalar '{name}'");
        };
        let Some((index, field)) = rest.split_once('_') else {
            bail!("unknown calibration config scalar '{name}'");
        };
        let Some(cp) = index
            .parse::<usize>()
            .ok()
            .and_then(|i| self.control_points.get_mut(i))
        else {
            bail!("unknown control point in '{name}'");
        };
        match field {
            "image_x" => cp.image.x = value,
            "image_y" => cp.image.y = value,
            "field_x" => cp.field.x = value,
            "field_y" => cp.field.y = value,
            _ => bail!("unknown control point scalar '{name}'"),
        }
        Ok(())
    }
}

fn non_negative_integer(name: &str, value: Real) -> Result<u32> {
    if !(value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as Real) {
        bail!("'{name}' must be a non-negative integer, got {value}");
    }
    Ok(value as u32)
}

/// Cameras along the field length and width for a given camera count.
fn camera_grid(num_cameras: usize) -> Option<(usize, usize)> {
    match num_cameras {
        1 => Some((1, 1)),
        2 => Some((2, 1)),
        4 => Some((2, 2)),
        6 => Some((3, 2)),
        8 => Some((4, 2)),
        _ => None,
    }
}

/// Field corners of the cell camera `camera_id` covers when `num_cameras`
/// cameras split the field into a grid.
///
/// Cameras are numbered column-major: ids `0..ny` cover the first strip
/// along the length. The corners are returned as `(x1, y1), (x1, y2),
/// (x2, y2), (x2, y1)`. Unsupported camera counts or out-of-range ids give
/// an empty list.
pub fn generate_camera_control_points(
    camera_id: usize,
    num_cameras: usize,
    field_length: Real,
    field_width: Real,
) -> Vec<Pt2> {
    let Some((nx, ny)) = camera_grid(num_cameras) else {
        error!("unsupported number of cameras: {num_cameras}");
        return Vec::new();
    };
    if camera_id >= num_cameras {
        warn!("camera id {camera_id} out of range for {num_cameras} cameras");
        return Vec::new();
    }
    let x_step = field_length / nx as Real;
    let y_step = field_width / ny as Real;
    let x_idx = camera_id / ny;
    let y_idx = camera_id % ny;

    let x1 = -0.5 * field_length + x_idx as Real * x_step;
    let x2 = x1 + x_step;
    let y1 = -0.5 * field_width + y_idx as Real * y_step;
    let y2 = y1 + y_step;
    vec![
        Pt2::new(x1, y1),
        Pt2::new(x1, y2),
        Pt2::new(x2, y2),
        Pt2::new(x2, y1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_factory_values() {
        let cfg = CalibrationConfig::default();
        assert_eq!(cfg.control_points[2].name, "CP 2");
        assert_eq!(cfg.control_points[2].image, Pt2::new(50.0, 150.0));
        assert_eq!(cfg.initial_distortion, 1.0);
        assert_eq!(cfg.line_search_corridor_width, 280.0);
        assert_eq!(cfg.max_feature_distance, 20000.0);
        assert_eq!(cfg.convergence_timeout, 10.0);
        assert_eq!(cfg.lm_options().timeout_s, 10.0);
        assert_eq!(cfg.covariance(), ObservationCovariance::default());
        assert!(cfg.pinhole_fix.fix_principal_point);
        assert!(!cfg.pinhole_fix.fix_focal_length);
        assert_eq!((cfg.grid_width, cfg.grid_height), (9, 6));
        assert_eq!(cfg.corner_diff_sq_threshold, 500.0);
        assert!(!cfg.use_intrinsic_guess);
        assert!(cfg.intrinsic_fix.fix_tangential_distortion);
        assert!(!cfg.intrinsic_fix.fix_principal_point);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn degenerate_chessboard_grid_is_rejected() {
        let cfg = CalibrationConfig {
            grid_height: 1,
            ..CalibrationConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(CalibrationError::InvalidConfig(_))));
    }

    #[test]
    fn single_camera_sees_whole_field() {
        let pts = generate_camera_control_points(0, 1, 9000.0, 6000.0);
        assert_eq!(
            pts,
            vec![
                Pt2::new(-4500.0, -3000.0),
                Pt2::new(-4500.0, 3000.0),
                Pt2::new(4500.0, 3000.0),
                Pt2::new(4500.0, -3000.0),
            ]
        );
    }

    #[test]
    fn four_cameras_split_into_quadrants() {
        // id 3 -> second column, second row
        let pts = generate_camera_control_points(3, 4, 9000.0, 6000.0);
        assert_eq!(pts[0], Pt2::new(0.0, 0.0));
        assert_eq!(pts[2], Pt2::new(4500.0, 3000.0));

        let pts = generate_camera_control_points(1, 4, 9000.0, 6000.0);
        assert_eq!(pts[0], Pt2::new(-4500.0, 0.0));
    }

    #[test]
    fn eight_camera_cells_tile_the_field() {
        let mut area = 0.0;
        for id in 0..8 {
            let pts = generate_camera_control_points(id, 8, 12000.0, 9000.0);
            assert_eq!(pts.len(), 4);
            area += (pts[2].x - pts[0].x) * (pts[2].y - pts[0].y);
        }
        assert!((area - 12000.0 * 9000.0).abs() < 1e-6);
    }

    #[test]
    fn unsupported_camera_count_is_empty() {
        assert!(generate_camera_control_points(0, 3, 9000.0, 6000.0).is_empty());
        assert!(generate_camera_control_points(5, 4, 9000.0, 6000.0).is_empty());
    }

    #[test]
    fn update_control_points_leaves_points_on_failure() {
        let mut cfg = CalibrationConfig::for_camera(1);
        assert!(!cfg.update_control_points(5, 9000.0, 6000.0));
        assert_eq!(cfg.control_points[0].field, Pt2::origin());

        assert!(cfg.update_control_points(2, 9000.0, 6000.0));
        assert_eq!(cfg.control_points[0].field, Pt2::new(0.0, -3000.0));
        assert_eq!(cfg.control_points[0].image, Pt2::new(50.0, 50.0));
    }

    #[test]
    fn non_positive_covariance_is_rejected() {
        let cfg = CalibrationConfig {
            cov_ls_y: 0.0,
            ..CalibrationConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(CalibrationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn scalar_hooks_roundtrip() {
        let mut cfg = CalibrationConfig::default();
        cfg.set_scalar("cov_ls_x", 4.0).unwrap();
        cfg.set_scalar("cp3_field_y", -1200.0).unwrap();
        cfg.set_scalar("image_width", 780.0).unwrap();
        cfg.set_scalar("grid_width", 7.0).unwrap();
        assert!(cfg.set_scalar("grid_height", 5.5).is_err());
        assert!(cfg.set_scalar("image_height", -1.0).is_err());
        assert!(cfg.set_scalar("cp7_field_y", 0.0).is_err());
        assert!(cfg.set_scalar("no_such_thing", 0.0).is_err());

        let mut copy = CalibrationConfig::default();
        for (name, value) in cfg.scalars() {
            copy.set_scalar(&name, value).unwrap();
        }
        assert_eq!(copy.cov_ls_x, 4.0);
        assert_eq!(copy.control_points[3].field.y, -1200.0);
        assert_eq!(copy.image_width, 780);
        assert_eq!(copy.grid_width, 7);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: CalibrationConfig =
            serde_json::from_str(r#"{ "camera_index": 2, "model": "pinhole" }"#).unwrap();
        assert_eq!(cfg.camera_index, 2);
        assert_eq!(cfg.model, CameraModelKind::Pinhole);
        assert_eq!(cfg.image_boundary, 10.0);
    }
}

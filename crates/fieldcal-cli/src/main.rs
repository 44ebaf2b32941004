use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use fieldcal_core::{CalibrationSegment, CameraModelParams, CornerCorrespondence, Pt2};
use fieldcal_pipeline::{
    CalibrationConfig, CalibrationMode, CalibrationReport, CameraParameters, DetectedFieldLine,
    GeometryCameraCalibration, IntrinsicsReport,
};
use log::info;
use serde::{Deserialize, Serialize};

/// Field camera calibration from recorded correspondences.
#[derive(Debug, Parser)]
#[command(author, version, about = "Overhead field camera calibration")]
struct Args {
    /// Path to JSON file containing a CalibrationInput.
    #[arg(long)]
    input: String,

    /// Optional path to JSON CalibrationConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    #[arg(long, value_enum, default_value_t = Mode::Full)]
    mode: Mode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Extrinsics (and focal length) from the corners only.
    FourPoint,
    /// Four-point pass followed by the full estimation.
    Full,
}

/// Everything one camera recorded for a calibration run.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CalibrationInput {
    /// Starting model; factory defaults of the configured kind if absent.
    #[serde(default)]
    model: Option<CameraModelParams>,
    #[serde(default)]
    corners: Vec<CornerCorrespondence>,
    #[serde(default)]
    segments: Vec<CalibrationSegment>,
    /// Detected field lines to harvest extra corners from.
    #[serde(default)]
    lines: Vec<DetectedFieldLine>,
    /// Chessboard inner corners per image for a pinhole intrinsics pass
    /// before the field calibration.
    #[serde(default)]
    chessboards: Vec<Vec<Pt2>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intrinsics: Option<IntrinsicsReport>,
    reports: Vec<CalibrationReport>,
    model: CameraModelParams,
    geometry: GeometryCameraCalibration,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

fn load_camera(input: CalibrationInput, config: CalibrationConfig) -> Result<CameraParameters> {
    let camera = CameraParameters::from_config(config);
    if let Some(model) = &input.model {
        camera.set_model(model.build());
    }
    camera.with_store(|store| -> Result<()> {
        for corner in &input.corners {
            let idx = store.add_corner_from(corner.image, corner.field, corner.source);
            store.set_corner_detected(idx, corner.detected)?;
        }
        for segment in &input.segments {
            let id = store.add_segment(segment.shape);
            for point in &segment.points {
                match point.alpha {
                    Some(alpha) => store.add_segment_observation_with_alpha(
                        id,
                        point.image,
                        point.detected,
                        alpha,
                    )?,
                    None => store.add_segment_observation(id, point.image, point.detected)?,
                };
            }
        }
        Ok(())
    })?;
    let mut accepted = 0;
    for corners in input.chessboards {
        if camera.add_chessboard(corners)? {
            accepted += 1;
        }
    }
    if accepted > 0 {
        info!("accepted {accepted} chessboard samples");
    }
    if !input.lines.is_empty() {
        let harvested = camera.detect_calibration_corners(&input.lines);
        info!(
            "harvested {harvested} corners from {} detected lines",
            input.lines.len()
        );
    }
    Ok(camera)
}

fn run_calibration_from_files(
    input_path: &str,
    config_path: Option<&str>,
    mode: Mode,
) -> Result<String> {
    let input: CalibrationInput = load_json_file(Path::new(input_path))?;

    let config = if let Some(cfg_path) = config_path {
        load_json_file::<CalibrationConfig>(Path::new(cfg_path))?
    } else {
        CalibrationConfig::default()
    };

    let camera = load_camera(input, config)?;
    let intrinsics = if camera.chessboard_count() > 0 {
        Some(camera.calibrate_intrinsics()?)
    } else {
        None
    };
    let mut reports = vec![camera.calibrate(CalibrationMode::FourPointInitial)?];
    if mode == Mode::Full {
        reports.push(camera.calibrate(CalibrationMode::FullEstimation)?);
    }

    let output = CalibrationOutput {
        intrinsics,
        reports,
        model: CameraModelParams::from(&camera.model()),
        geometry: camera.to_geometry(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let json = run_calibration_from_files(&args.input, args.config.as_deref(), args.mode)?;
    println!("{}", json);
    Ok(())
}

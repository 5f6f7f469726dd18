use anyhow::{Context, Result};
use rollcall_core::{default_model_dir, DetectionModel, DEFAULT_DISTANCE_THRESHOLD};
use rollcall_hw::CaptureBackend;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_FILE_VAR: &str = "ROLLCALL_CONFIG";

const DEFAULT_FRAME_SCALE: f32 = 0.25;

/// Runtime configuration.
///
/// Resolved from defaults, then an optional TOML file whose keys are the
/// lowercase environment names (`images_path = "Images"`), then environment
/// variables. Unparseable values fall back to the default with a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory of `Person_Name.jpg` reference images.
    pub images_path: PathBuf,
    /// Ledger base filename.
    pub attendance_file: PathBuf,
    /// Write one ledger per day (`Attendance_YYYY-MM-DD.csv`).
    pub daily_rotation: bool,
    /// V4L2 device index (`/dev/video{index}`).
    pub camera_index: u32,
    /// Downscale factor applied before detection, in (0, 1].
    pub frame_scale: f32,
    pub detection_model: DetectionModel,
    /// Maximum (exclusive) embedding distance for a match.
    pub distance_threshold: f32,
    /// Run without a preview window.
    pub headless: bool,
    pub video_backend: CaptureBackend,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Frames read and discarded after the camera opens.
    pub warmup_frames: usize,
    /// Per-iteration pause in headless mode.
    pub headless_sleep: Duration,
    /// TrueType font for on-frame labels; the bundled font when unset.
    pub font_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            images_path: PathBuf::from("Images"),
            attendance_file: PathBuf::from("Attendance.csv"),
            daily_rotation: false,
            camera_index: 0,
            frame_scale: DEFAULT_FRAME_SCALE,
            detection_model: DetectionModel::Fast,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            headless: false,
            video_backend: CaptureBackend::Mmap,
            model_dir: default_model_dir(),
            warmup_frames: 5,
            headless_sleep: Duration::from_millis(5),
            font_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the optional TOML `file` (or `$ROLLCALL_CONFIG`)
    /// and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_FILE_VAR).map(PathBuf::from));

        let table = match &file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config at {}", path.display()))?;
                parse_table(&raw).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => HashMap::new(),
        };

        Ok(Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| table.get(&key.to_ascii_lowercase()).cloned())
        }))
    }

    /// Build a configuration from a key lookup (environment-style names).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();

        let frame_scale = match setting(&lookup, "FRAME_SCALE", d.frame_scale) {
            s if s > 0.0 && s <= 1.0 => s,
            s => {
                tracing::warn!(value = s, "FRAME_SCALE must be in (0, 1], using default");
                d.frame_scale
            }
        };

        let distance_threshold = match setting(&lookup, "DISTANCE_THRESHOLD", d.distance_threshold) {
            t if t.is_finite() && t > 0.0 => t,
            t => {
                tracing::warn!(value = t, "DISTANCE_THRESHOLD must be positive, using default");
                d.distance_threshold
            }
        };

        Self {
            images_path: lookup("IMAGES_PATH").map(PathBuf::from).unwrap_or(d.images_path),
            attendance_file: lookup("ATTENDANCE_FILE")
                .map(PathBuf::from)
                .unwrap_or(d.attendance_file),
            daily_rotation: flag(&lookup, "DAILY_ROTATION", d.daily_rotation),
            camera_index: setting(&lookup, "CAMERA_INDEX", d.camera_index),
            frame_scale,
            detection_model: setting(&lookup, "DETECTION_MODEL", d.detection_model),
            distance_threshold,
            headless: flag(&lookup, "NO_GUI", d.headless),
            video_backend: setting(&lookup, "VIDEO_BACKEND", d.video_backend),
            model_dir: lookup("ROLLCALL_MODEL_DIR").map(PathBuf::from).unwrap_or(d.model_dir),
            warmup_frames: setting(&lookup, "ROLLCALL_WARMUP_FRAMES", d.warmup_frames),
            headless_sleep: Duration::from_millis(setting(
                &lookup,
                "ROLLCALL_HEADLESS_SLEEP_MS",
                d.headless_sleep.as_millis() as u64,
            )),
            font_path: lookup("ROLLCALL_FONT_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Resolved settings as (key, value) pairs, for display.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("images_path", self.images_path.display().to_string()),
            ("attendance_file", self.attendance_file.display().to_string()),
            ("daily_rotation", self.daily_rotation.to_string()),
            ("camera_index", self.camera_index.to_string()),
            ("frame_scale", self.frame_scale.to_string()),
            ("detection_model", self.detection_model.to_string()),
            ("distance_threshold", format!("{:.2}", self.distance_threshold)),
            ("no_gui", self.headless.to_string()),
            ("video_backend", self.video_backend.to_string()),
            ("rollcall_model_dir", self.model_dir.display().to_string()),
            ("rollcall_warmup_frames", self.warmup_frames.to_string()),
            (
                "rollcall_headless_sleep_ms",
                self.headless_sleep.as_millis().to_string(),
            ),
            (
                "rollcall_font_path",
                self.font_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
        ]
    }

    pub fn log_summary(&self) {
        tracing::info!(
            images = %self.images_path.display(),
            ledger = %self.attendance_file.display(),
            daily_rotation = self.daily_rotation,
            camera = self.camera_index,
            frame_scale = self.frame_scale,
            detection = %self.detection_model,
            threshold = self.distance_threshold,
            backend = %self.video_backend,
            headless = self.headless,
            "configuration"
        );
    }
}

/// Flatten a TOML document into lowercase key → string value.
fn parse_table(raw: &str) -> Result<HashMap<String, String>> {
    let table: toml::Table = raw.parse()?;
    Ok(table
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Boolean(b) => if b { "1" } else { "0" }.to_string(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                other => {
                    tracing::warn!(%key, value = %other, "ignoring non-scalar config value");
                    return None;
                }
            };
            Some((key.to_ascii_lowercase(), value))
        })
        .collect())
}

fn setting<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!(key, value = %raw, error = %e, "invalid setting, using default");
            default
        }),
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).as_deref().map(str::trim) {
        None => default,
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") | Some("") => false,
        Some(other) => {
            tracing::warn!(key, value = other, "invalid flag, using default");
            default
        }
    }
}

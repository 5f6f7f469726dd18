//! rollcall-core: Face enrollment and matching engine.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime, behind the [`FaceProvider`] trait.

pub mod alignment;
pub mod detector;
pub mod enroll;
pub mod matcher;
pub mod provider;
pub mod recognizer;
pub mod types;

pub use detector::FaceDetector;
pub use enroll::{enroll_directory, EnrollError, EnrollStatus, Enrollment};
pub use matcher::{Matcher, NearestMatcher, DEFAULT_DISTANCE_THRESHOLD};
pub use provider::{
    convert_color_order, default_model_dir, DetectionModel, FaceProvider, OnnxFaceProvider,
    ProviderError,
};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, ColorOrder, DistanceMetric, Embedding, Identity, MatchOutcome};

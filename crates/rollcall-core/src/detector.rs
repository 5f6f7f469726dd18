//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB image into the network input, decodes the three
//! anchor-free stride heads and suppresses overlapping boxes.

use crate::types::BoundingBox;
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download an insightface model pack and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("empty input image")]
    EmptyImage,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Placement of the source image inside the square network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, input_size: usize) -> (Self, u32, u32) {
        let scale = (input_size as f32 / width as f32).min(input_size as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, input_size as u32);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, input_size as u32);
        let pad_x = ((input_size as u32 - new_w) / 2) as f32;
        let pad_y = ((input_size as u32 - new_h) / 2) as f32;
        (Self { scale, pad_x, pad_y }, new_w, new_h)
    }

    /// Map a point in network input space back to source image space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score, bbox, kps).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
    /// Per-stride output indices for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load an SCRFD ONNX model, running it at `input_size`×`input_size`.
    pub fn load(model_path: &str, input_size: usize) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            input_size,
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_size,
            stride_indices,
        })
    }

    /// Detect faces, returning bounding boxes in image coordinates sorted by confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectorError::EmptyImage);
        }
        let (input, letterbox) = preprocess(image, self.input_size);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[pos];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let heads = StrideHeads {
                scores: extract(score_idx, "scores")?,
                bboxes: extract(bbox_idx, "bboxes")?,
                kps: extract(kps_idx, "kps")?,
            };
            detections.extend(heads.decode(stride, self.input_size, &letterbox, SCRFD_CONFIDENCE_THRESHOLD));
        }

        Ok(nms(detections, SCRFD_NMS_THRESHOLD))
    }
}

/// Letterbox an RGB image into a normalized NCHW tensor.
fn preprocess(image: &RgbImage, input_size: usize) -> (Array4<f32>, Letterbox) {
    let (letterbox, new_w, new_h) = Letterbox::fit(image.width(), image.height(), input_size);
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    // Padding is filled with the mean so it normalizes to 0.0.
    let mut tensor = Array4::<f32>::zeros((1, 3, input_size, input_size));
    let (x0, y0) = (letterbox.pad_x as u32, letterbox.pad_y as u32);
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, (y + y0) as usize, (x + x0) as usize]] =
                (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Raw head outputs for one stride.
struct StrideHeads<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

impl StrideHeads<'_> {
    fn decode(
        &self,
        stride: usize,
        input_size: usize,
        letterbox: &Letterbox,
        threshold: f32,
    ) -> Vec<BoundingBox> {
        let grid = input_size / stride;
        let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let s = stride as f32;

        (0..num_anchors)
            .filter_map(|idx| {
                let score = self.scores.get(idx).copied().unwrap_or(0.0);
                if score <= threshold {
                    return None;
                }

                let cell = idx / SCRFD_ANCHORS_PER_CELL;
                let ax = (cell % grid) as f32 * s;
                let ay = (cell / grid) as f32 * s;

                let d = self.bboxes.get(idx * 4..idx * 4 + 4)?;
                let (x1, y1) = letterbox.unmap(ax - d[0] * s, ay - d[1] * s);
                let (x2, y2) = letterbox.unmap(ax + d[2] * s, ay + d[3] * s);

                let landmarks = self.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                    std::array::from_fn(|i| letterbox.unmap(ax + k[i * 2] * s, ay + k[i * 2 + 1] * s))
                });

                Some(BoundingBox {
                    x: x1,
                    y: y1,
                    width: x2 - x1,
                    height: y2 - y1,
                    confidence: score,
                    landmarks,
                })
            })
            .collect()
    }
}

/// Map output tensors to stride slots.
///
/// Exports name tensors either "score_8", "bbox_16", "kps_32", ... or with
/// opaque numbers. Unrecognized names fall back to the standard order:
/// [0-2] scores, [3-5] bboxes, [6-8] kps, each for strides 8/16/32.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => {
            tracing::debug!(?names, "SCRFD output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Non-maximum suppression. Output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        let c = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &c).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_roundtrip() {
        let (lb, new_w, new_h) = Letterbox::fit(320, 240, 640);
        assert_eq!((new_w, new_h), (640, 480));
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);
        let (x, y) = lb.unmap(100.0 * lb.scale + lb.pad_x, 50.0 * lb.scale + lb.pad_y);
        assert!((x - 100.0).abs() < 0.1 && (y - 50.0).abs() < 0.1);
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let image = RgbImage::from_pixel(64, 32, Rgb([255, 0, 128]));
        let (tensor, lb) = preprocess(&image, 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(lb.pad_y, 16.0);
        // Padding row.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        // Image row, channels kept in input order.
        let r = tensor[[0, 0, 32, 32]];
        let g = tensor[[0, 1, 32, 32]];
        assert!((r - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
        assert!((g - (0.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
    }

    #[test]
    fn test_decode_single_anchor() {
        // 32x32 input, stride 16 → 2x2 grid, 8 anchors.
        let mut scores = vec![0.0f32; 8];
        scores[3] = 0.9; // cell 1 → (x=1, y=0)
        let mut bboxes = vec![0.0f32; 32];
        bboxes[12..16].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);
        let kps = vec![0.0f32; 80];
        let heads = StrideHeads {
            scores: &scores,
            bboxes: &bboxes,
            kps: &kps,
        };
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };

        let dets = heads.decode(16, 32, &lb, 0.5);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!((d.x, d.y, d.width, d.height), (8.0, 0.0, 16.0, 16.0));
        assert_eq!(d.landmarks.unwrap()[0], (16.0, 0.0));
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();
        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }
}

//! Face encoder backed by two ONNX Runtime sessions: a YOLO face detector
//! for boxes and an embedding model for 128-component feature vectors.

use std::path::Path;
use std::sync::Mutex;

use crate::config::DetectionModel;
use crate::detection::domain::face_encoder::{EncodedFace, FaceEncoder};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::feature_vector::FeatureVector;
use crate::shared::frame::Frame;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

const NMS_IOU_THRESH: f64 = 0.45;

/// Embedding input side used when the model does not fix one.
const DEFAULT_EMBEDDING_SIZE: usize = 150;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxFaceEncoder {
    detector: Mutex<ort::session::Session>,
    embedder: Mutex<ort::session::Session>,
    detector_input: Option<u32>,
    embedding_input: usize,
    confidence: f64,
}

impl OnnxFaceEncoder {
    /// Loads both models. A detector with a fixed NCHW input keeps that
    /// size; a dynamic one uses the size of the requested [`DetectionModel`].
    pub fn new(
        detector_path: &Path,
        embedding_path: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = build_session(detector_path)?;
        let embedder = build_session(embedding_path)?;
        let detector_input = fixed_input_side(&detector).map(|s| s as u32);
        let embedding_input = fixed_input_side(&embedder).unwrap_or(DEFAULT_EMBEDDING_SIZE);
        log::info!(
            "Loaded face models (detector input: {}, embedding input: {embedding_input})",
            detector_input.map_or("dynamic".to_string(), |s| s.to_string()),
        );
        Ok(Self {
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
            detector_input,
            embedding_input,
            confidence,
        })
    }

    fn detect(
        &self,
        frame: &Frame,
        input_size: u32,
    ) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, input_size);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let mut session = self
            .detector
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("detector produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let letterboxed = Letterbox { scale, pad_x, pad_y };
        let mut dets = decode_detections(data, tensor.shape(), self.confidence, &letterboxed)?;
        Ok(nms(&mut dets, NMS_IOU_THRESH))
    }

    fn embed(&self, crop: &Frame) -> Result<FeatureVector, Box<dyn std::error::Error>> {
        let tensor = preprocess_crop(crop, self.embedding_input);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .embedder
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding = outputs[0].try_extract_array::<f32>()?;
        let components = embedding
            .as_slice()
            .ok_or("Cannot get embedding slice")?
            .to_vec();
        Ok(FeatureVector::new(components)?)
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(
        &self,
        frame: &Frame,
        scale: f64,
        model: DetectionModel,
    ) -> Result<Vec<EncodedFace>, Box<dyn std::error::Error>> {
        let small = frame.downscaled(scale);
        let input_size = self.detector_input.unwrap_or_else(|| model.input_size());
        let effective_scale = small.width() as f64 / frame.width() as f64;

        let mut faces = Vec::new();
        for det in self.detect(&small, input_size)? {
            let bbox = BoundingBox::new(
                det.x1.round() as i32,
                det.y1.round() as i32,
                det.x2.round() as i32,
                det.y2.round() as i32,
            )
            .unscaled(effective_scale)
            .clamped(frame.width(), frame.height());
            let Some(crop) = frame.crop(&bbox) else {
                continue;
            };
            faces.push(EncodedFace {
                bbox,
                features: self.embed(&crop)?,
            });
        }
        Ok(faces)
    }
}

fn build_session(path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)?;
    Ok(session)
}

/// Reads H from an `[N, C, H, W]` input; `None` when the dimension is dynamic.
fn fixed_input_side(session: &ort::session::Session) -> Option<usize> {
    session.inputs().first().and_then(|input| {
        if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
            (shape.len() >= 4 && shape[2] > 0).then(|| shape[2] as usize)
        } else {
            None
        }
    })
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // YOLO pads with 114 gray.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, pad_y as usize + y, pad_x as usize + x]] =
                    src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

/// Resize a face crop to `size` × `size`, normalize to [-1, 1], NCHW layout.
fn preprocess_crop(crop: &Frame, size: usize) -> ndarray::Array4<f32> {
    let src = crop.as_ndarray();
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / size as f64) as usize).min(src_h - 1);
        for x in 0..size {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / size as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[src_y, src_x, c]] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }
    tensor
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

impl RawDetection {
    fn corners(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Parses YOLO output rows `[cx, cy, w, h, conf, ...]` into boxes in the
/// coordinates of the frame that was letterboxed.
///
/// Accepts both `[1, features, detections]` and `[1, detections, features]`.
fn decode_detections(
    data: &[f32],
    shape: &[usize],
    min_confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 || data.len() < num_dets * num_feats {
        return Err(format!("YOLO output too small for shape {shape:?}").into());
    }

    let value = |det: usize, feat: usize| -> f64 {
        let i = if transposed {
            feat * num_dets + det
        } else {
            det * num_feats + feat
        };
        data[i] as f64
    };

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let conf = value(i, 4);
        if conf < min_confidence {
            continue;
        }
        let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);
        dets.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence: conf,
        });
    }
    Ok(dets)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep
            .iter()
            .all(|kept| bbox_iou(&kept.corners(), &det.corners()) <= iou_thresh)
        {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raw(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → 320: scale 1.6, content 320x160, pad_y 80
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let (tensor, scale, pad_x, pad_y) = letterbox(&frame, 320);

        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        assert_relative_eq!(scale, 1.6);
        assert_eq!(pad_x, 0);
        assert_eq!(pad_y, 80);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], 114.0 / 255.0);
        assert_relative_eq!(tensor[[0, 0, 100, 10]], 128.0 / 255.0);
    }

    #[test]
    fn test_decode_maps_letterbox_coords_back() {
        // Features-major layout [1, 5, 6]: only the first detection is confident.
        let data = vec![
            100.0, 50.0, 0.0, 0.0, 0.0, 0.0, // cx
            180.0, 50.0, 0.0, 0.0, 0.0, 0.0, // cy
            40.0, 10.0, 0.0, 0.0, 0.0, 0.0, // w
            40.0, 10.0, 0.0, 0.0, 0.0, 0.0, // h
            0.9, 0.1, 0.0, 0.0, 0.0, 0.0, // conf
        ];
        let letterbox = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 80,
        };
        let dets = decode_detections(&data, &[1, 5, 6], 0.25, &letterbox).unwrap();

        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 40.0);
        assert_relative_eq!(dets[0].y1, 40.0);
        assert_relative_eq!(dets[0].x2, 60.0);
        assert_relative_eq!(dets[0].y2, 60.0);
    }

    #[test]
    fn test_decode_row_major_layout() {
        // [1, 6, 5]: six detections of five features each.
        let mut data = vec![0.0f32; 30];
        data[..5].copy_from_slice(&[10.0, 10.0, 4.0, 4.0, 0.8]);
        data[5..10].copy_from_slice(&[20.0, 20.0, 4.0, 4.0, 0.2]);
        data[10..15].copy_from_slice(&[30.0, 30.0, 4.0, 4.0, 0.6]);
        let identity = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        let dets = decode_detections(&data, &[1, 6, 5], 0.5, &identity).unwrap();
        assert_eq!(dets.len(), 2);
        assert_relative_eq!(dets[1].x1, 28.0);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let identity = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        assert!(decode_detections(&[0.0; 4], &[1, 4], 0.5, &identity).is_err());
        assert!(decode_detections(&[0.0; 4], &[1, 2, 2], 0.5, &identity).is_err());
    }

    #[test]
    fn test_nms_keeps_highest_of_overlapping() {
        let mut dets = vec![
            raw(0.0, 0.0, 100.0, 100.0, 0.5),
            raw(2.0, 2.0, 102.0, 102.0, 0.9),
            raw(200.0, 200.0, 250.0, 250.0, 0.7),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert_relative_eq!(kept[0].confidence, 0.9);
        assert_relative_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(&mut [], 0.3).is_empty());
    }

    #[test]
    fn test_preprocess_crop_shape_and_range() {
        let crop = Frame::new(vec![255u8; 20 * 30 * 3], 20, 30, 3, 0);
        let tensor = preprocess_crop(&crop, 150);
        assert_eq!(tensor.shape(), &[1, 3, 150, 150]);
        assert_relative_eq!(tensor[[0, 2, 149, 149]], 1.0);
    }

    #[test]
    fn test_bbox_iou_partial_overlap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [5.0, 5.0, 15.0, 15.0];
        assert_relative_eq!(bbox_iou(&a, &b), 25.0 / 175.0);
    }
}

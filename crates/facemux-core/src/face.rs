//! Primary face detector: finds faces in a full frame and produces the
//! square regions of interest the secondary classifiers consume.

use serde::Deserialize;
use tracing::{debug, info};

use crate::backend::{Backend, ElementType, InferRequest, Model};
use crate::detector::{Detector, DetectorConfig, DetectorCore, DetectorError};
use crate::frame::Frame;
use crate::types::{Detection, FaceRect};

const LABEL: &str = "face detection";

/// Settings for the primary detector on top of the common ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaceDetectorConfig {
    #[serde(flatten)]
    pub detector: DetectorConfig,
    /// Proposals at or below this confidence are discarded.
    pub confidence_threshold: f32,
    /// Region side length as a multiple of the longest box side.
    pub roi_scale: f32,
    /// Horizontal recentering coefficient for the enlarged region.
    pub roi_dx: f32,
    /// Vertical recentering coefficient for the enlarged region.
    pub roi_dy: f32,
}

impl Default for FaceDetectorConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            confidence_threshold: 0.5,
            roi_scale: 1.2,
            roi_dx: 1.0,
            roi_dy: 1.0,
        }
    }
}

impl FaceDetectorConfig {
    pub fn new(model_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            detector: DetectorConfig::new(model_path),
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

/// How the detection model reports its proposals.
#[derive(Debug, Clone)]
enum OutputLayout {
    /// One 4-D output whose rows are
    /// `[image_id, label, confidence, x_min, y_min, x_max, y_max]`,
    /// normalized coordinates, terminated by a negative image id.
    Ssd { name: String, max_proposals: usize },
    /// A `[N, 5]` boxes output (`x_min, y_min, x_max, y_max, confidence`
    /// in network-input pixels) plus a rank-1 labels output.
    BoxesLabels { boxes: String, labels: String },
}

pub struct FaceDetector<B: Backend> {
    core: DetectorCore<B>,
    threshold: f32,
    roi_scale: f32,
    roi_dx: f32,
    roi_dy: f32,
    input_name: String,
    layout: Option<OutputLayout>,
    net_input_width: usize,
    net_input_height: usize,
    frame_width: u32,
    frame_height: u32,
    /// Decoded proposals of the last completed run, kept until the next
    /// enqueue so repeated fetches see the same set.
    results: Option<Vec<Detection>>,
}

impl<B: Backend> FaceDetector<B> {
    pub fn new(config: FaceDetectorConfig) -> Self {
        Self {
            core: DetectorCore::new(config.detector, LABEL),
            threshold: config.confidence_threshold,
            roi_scale: config.roi_scale,
            roi_dx: config.roi_dx,
            roi_dy: config.roi_dy,
            input_name: String::new(),
            layout: None,
            net_input_width: 0,
            net_input_height: 0,
            frame_width: 0,
            frame_height: 0,
            results: None,
        }
    }

    /// Stage one frame into the request, replacing whatever was staged
    /// before. Invalidates results of the previous run.
    ///
    /// A rejected enqueue leaves the cached results and the recorded
    /// frame size untouched.
    pub fn enqueue(&mut self, frame: &Frame) -> Result<(), DetectorError> {
        if !self.core.enabled() {
            return Ok(());
        }
        let req = self.core.ensure_request()?;
        req.bind_input(&self.input_name, 0, frame.data())?;
        self.results = None;
        self.frame_width = frame.width();
        self.frame_height = frame.height();
        Ok(())
    }

    /// Decode the completed run into filtered, refined detections.
    ///
    /// Idempotent between submits: the first call decodes and caches,
    /// later calls return the same slice.
    pub fn fetch_results(&mut self) -> Result<&[Detection], DetectorError> {
        if !self.core.enabled() {
            return Ok(&[]);
        }
        if self.results.is_none() {
            let decoded = self.decode()?;
            self.results = Some(decoded);
        }
        Ok(self.results.as_deref().unwrap_or(&[]))
    }

    fn decode(&self) -> Result<Vec<Detection>, DetectorError> {
        let req = self.core.ready_request()?;
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| self.core.topology_error("model was never read"))?;
        let raw = self.core.config().raw_output;
        let width = self.frame_width as f32;
        let height = self.frame_height as f32;
        let mut out = Vec::new();
        match layout {
            OutputLayout::Ssd {
                name,
                max_proposals,
            } => {
                let data = req.output(name)?.as_f32()?;
                for row in data.chunks_exact(7).take(*max_proposals) {
                    if row[0] < 0.0 {
                        break;
                    }
                    let label = row[1] as i32;
                    let confidence = row[2];
                    let rect = self.refine(FaceRect::new(
                        (row[3] * width) as i32,
                        (row[4] * height) as i32,
                        ((row[5] - row[3]) * width) as i32,
                        ((row[6] - row[4]) * height) as i32,
                    ));
                    if raw {
                        debug!(
                            label,
                            confidence,
                            x = rect.x,
                            y = rect.y,
                            w = rect.width,
                            h = rect.height,
                            kept = confidence > self.threshold,
                            "proposal"
                        );
                    }
                    if confidence > self.threshold {
                        out.push(Detection {
                            label,
                            confidence,
                            rect,
                        });
                    }
                }
            }
            OutputLayout::BoxesLabels { boxes, labels } => {
                let box_data = req.output(boxes)?.as_f32()?;
                let label_data = req.output(labels)?.as_i32()?;
                let net_w = self.net_input_width as f32;
                let net_h = self.net_input_height as f32;
                for (row, &label) in box_data.chunks_exact(5).zip(label_data) {
                    let confidence = row[4];
                    let rect = self.refine(FaceRect::new(
                        (row[0] / net_w * width) as i32,
                        (row[1] / net_h * height) as i32,
                        ((row[2] - row[0]) / net_w * width) as i32,
                        ((row[3] - row[1]) / net_h * height) as i32,
                    ));
                    if raw {
                        debug!(
                            label,
                            confidence,
                            x = rect.x,
                            y = rect.y,
                            w = rect.width,
                            h = rect.height,
                            kept = confidence > self.threshold,
                            "proposal"
                        );
                    }
                    if confidence > self.threshold {
                        out.push(Detection {
                            label,
                            confidence,
                            rect,
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    /// Square and enlarge a raw box so the classifiers get stable
    /// context around the face.
    fn refine(&self, rect: FaceRect) -> FaceRect {
        let center_x = rect.x + rect.width / 2;
        let center_y = rect.y + rect.height / 2;
        let longest = rect.width.max(rect.height);
        let size = (self.roi_scale * longest as f32) as i32;
        FaceRect {
            x: center_x - (self.roi_dx * size as f32 / 2.0).floor() as i32,
            y: center_y - (self.roi_dy * size as f32 / 2.0).floor() as i32,
            width: size,
            height: size,
        }
    }
}

impl<B: Backend> Detector<B> for FaceDetector<B> {
    fn core(&self) -> &DetectorCore<B> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DetectorCore<B> {
        &mut self.core
    }

    fn read(&mut self, backend: &B) -> Result<B::Model, DetectorError> {
        let mut model = backend.read_model(&self.core.config().model_path)?;
        model.set_batch_size(self.core.config().max_batch);

        let info = model.info().clone();
        if info.inputs.len() != 1 {
            return Err(self.core.topology_error(format!(
                "expected exactly one input, found {}",
                info.inputs.len()
            )));
        }
        let input = &info.inputs[0];
        if input.rank() != 4 {
            return Err(self
                .core
                .topology_error(format!("expected a 4-D input, got rank {}", input.rank())));
        }
        self.input_name = input.name.clone();
        self.net_input_height = input.shape[2];
        self.net_input_width = input.shape[3];
        model.set_input_precision(&input.name, ElementType::U8)?;

        self.layout = Some(match info.outputs.len() {
            1 => {
                let out = &info.outputs[0];
                if out.rank() != 4 {
                    return Err(self.core.topology_error(format!(
                        "expected a 4-D detection output, got rank {}",
                        out.rank()
                    )));
                }
                if out.shape[3] != 7 {
                    return Err(self.core.topology_error(format!(
                        "detection rows must hold 7 values, got {}",
                        out.shape[3]
                    )));
                }
                model.set_output_precision(&out.name, ElementType::F32)?;
                OutputLayout::Ssd {
                    name: out.name.clone(),
                    max_proposals: out.shape[2],
                }
            }
            2 => {
                let mut boxes = None;
                let mut labels = None;
                for out in &info.outputs {
                    if out.rank() == 2 && out.shape[1] == 5 {
                        boxes = Some(out.name.clone());
                    } else if out.rank() == 1 {
                        labels = Some(out.name.clone());
                    }
                }
                match (boxes, labels) {
                    (Some(boxes), Some(labels)) => {
                        model.set_output_precision(&boxes, ElementType::F32)?;
                        model.set_output_precision(&labels, ElementType::I32)?;
                        OutputLayout::BoxesLabels { boxes, labels }
                    }
                    _ => {
                        return Err(self.core.topology_error(
                            "two outputs must be a [N,5] boxes tensor and a rank-1 labels tensor",
                        ))
                    }
                }
            }
            n => {
                return Err(self
                    .core
                    .topology_error(format!("expected one or two outputs, found {n}")))
            }
        });

        info!(
            detector = LABEL,
            model = %self.core.config().model_path.display(),
            net_input_width = self.net_input_width,
            net_input_height = self.net_input_height,
            "model read"
        );
        Ok(model)
    }
}

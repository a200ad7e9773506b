//! Secondary face classifiers.
//!
//! Every classifier follows the same protocol: face crops are staged
//! slot by slot up to `max_batch`, one submit runs the whole batch, and
//! results are read back per slot. The protocol lives in
//! [`BatchClassifier`]; what distinguishes the models is how their
//! output tensors decode, captured by [`OutputDecoder`] implementations.

mod age_gender;
mod antispoof;
mod emotions;
mod head_pose;
mod landmarks;

pub use age_gender::{AgeGender, AgeGenderDecoder};
pub use antispoof::AntispoofDecoder;
pub use emotions::{Emotions, EmotionsDecoder};
pub use head_pose::{HeadPose, HeadPoseDecoder};
pub use landmarks::LandmarksDecoder;

use tracing::{debug, warn};

use crate::backend::{Backend, BackendError, ElementType, InferRequest, Model};
use crate::detector::{Detector, DetectorConfig, DetectorCore, DetectorError};
use crate::frame::Frame;

pub type AgeGenderClassifier<B> = BatchClassifier<B, AgeGenderDecoder>;
pub type HeadPoseClassifier<B> = BatchClassifier<B, HeadPoseDecoder>;
pub type EmotionsClassifier<B> = BatchClassifier<B, EmotionsDecoder>;
pub type LandmarksClassifier<B> = BatchClassifier<B, LandmarksDecoder>;
pub type AntispoofClassifier<B> = BatchClassifier<B, AntispoofDecoder>;

/// Failure inside a decoder, translated into [`DetectorError`] by the
/// owning classifier so messages carry the model's label.
#[derive(Debug)]
pub enum DecodeError {
    Backend(BackendError),
    Topology(String),
}

impl From<BackendError> for DecodeError {
    fn from(e: BackendError) -> Self {
        DecodeError::Backend(e)
    }
}

/// Model-specific half of a classifier: output validation and per-slot
/// result decoding.
pub trait OutputDecoder {
    /// Decoded result for one batch slot.
    type Output: std::fmt::Debug;

    /// Human-readable model name for logs and errors.
    const LABEL: &'static str;

    /// Check the model's output ports, fix their precisions, and record
    /// the names [`Self::decode`] will read.
    fn validate<M: Model>(&mut self, model: &mut M) -> Result<(), DecodeError>;

    /// Decode batch slot `idx` from a completed request.
    fn decode<R: InferRequest>(&self, req: &R, idx: usize) -> Result<Self::Output, DecodeError>;
}

/// Generic batched classifier driving an [`OutputDecoder`] through the
/// shared detector lifecycle.
pub struct BatchClassifier<B: Backend, D: OutputDecoder> {
    core: DetectorCore<B>,
    decoder: D,
    input_name: String,
    /// Crops staged since the last submit.
    enqueued: usize,
    /// Size of the batch behind the current results.
    submitted: usize,
}

impl<B: Backend, D: OutputDecoder> BatchClassifier<B, D> {
    pub fn new(config: DetectorConfig, decoder: D) -> Self {
        Self {
            core: DetectorCore::new(config, D::LABEL),
            decoder,
            input_name: String::new(),
            enqueued: 0,
            submitted: 0,
        }
    }

    pub fn enqueued(&self) -> usize {
        self.enqueued
    }

    /// Stage one face crop into the next free batch slot.
    ///
    /// A full batch drops the crop with a warning rather than failing;
    /// the caller decides how many faces per frame matter by sizing
    /// `max_batch`.
    pub fn enqueue(&mut self, crop: &Frame) -> Result<(), DetectorError> {
        if !self.core.enabled() {
            return Ok(());
        }
        let max = self.core.config().max_batch;
        if self.enqueued >= max {
            warn!(
                detector = self.core.label(),
                max_batch = max,
                "batch full, dropping face crop"
            );
            return Ok(());
        }
        let slot = self.enqueued;
        let req = self.core.ensure_request()?;
        req.bind_input(&self.input_name, slot, crop.data())?;
        self.enqueued += 1;
        Ok(())
    }

    /// Run the staged batch, shrinking the effective batch to the
    /// filled slots when the executable supports it. A no-op when
    /// nothing is staged.
    pub fn submit(&mut self) -> Result<(), DetectorError> {
        if !self.core.enabled() || self.enqueued == 0 {
            return Ok(());
        }
        if self.core.dynamic_batch() {
            let count = self.enqueued;
            let req = self.core.ensure_request()?;
            req.set_effective_batch(count)?;
        }
        self.core.submit()?;
        self.submitted = self.enqueued;
        self.enqueued = 0;
        Ok(())
    }

    /// Decode the result for batch slot `idx` of the last submit.
    pub fn result(&self, idx: usize) -> Result<D::Output, DetectorError> {
        if idx >= self.submitted {
            return Err(self.core.bad_index(idx, self.submitted));
        }
        let req = self.core.ready_request()?;
        let value = self.decoder.decode(req, idx).map_err(|e| self.lift(e))?;
        if self.core.config().raw_output {
            debug!(detector = self.core.label(), idx, value = ?value, "decoded");
        }
        Ok(value)
    }

    fn lift(&self, e: DecodeError) -> DetectorError {
        match e {
            DecodeError::Backend(b) => DetectorError::Backend(b),
            DecodeError::Topology(reason) => self.core.topology_error(reason),
        }
    }
}

impl<B: Backend, D: OutputDecoder> Detector<B> for BatchClassifier<B, D> {
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
        self.input_name = info.inputs[0].name.clone();
        model.set_input_precision(&self.input_name, ElementType::U8)?;

        self.decoder.validate(&mut model).map_err(|e| self.lift(e))?;
        Ok(model)
    }
}

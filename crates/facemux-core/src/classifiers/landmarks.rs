//! Facial landmarks decoder.

use crate::backend::{ElementType, InferRequest, Model};

use super::{DecodeError, OutputDecoder};

const OUTPUT_NAME: &str = "align_fc3";

/// Expects a rank-2 output named `align_fc3` with an even channel
/// count: interleaved normalized (x, y) landmark coordinates.
#[derive(Debug, Default)]
pub struct LandmarksDecoder {
    channels: usize,
}

impl LandmarksDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputDecoder for LandmarksDecoder {
    type Output = Vec<(f32, f32)>;

    const LABEL: &'static str = "facial landmarks";

    fn validate<M: Model>(&mut self, model: &mut M) -> Result<(), DecodeError> {
        let outputs = model.info().outputs.clone();
        let out = outputs
            .iter()
            .find(|out| out.name == OUTPUT_NAME)
            .ok_or_else(|| DecodeError::Topology(format!("missing output {OUTPUT_NAME}")))?;
        if out.rank() != 2 {
            return Err(DecodeError::Topology(format!(
                "output {OUTPUT_NAME} must be rank 2, got rank {}",
                out.rank()
            )));
        }
        if out.shape[1] == 0 || out.shape[1] % 2 != 0 {
            return Err(DecodeError::Topology(format!(
                "output {OUTPUT_NAME} must hold coordinate pairs, got {} channels",
                out.shape[1]
            )));
        }
        self.channels = out.shape[1];
        model.set_output_precision(OUTPUT_NAME, ElementType::F32)?;
        Ok(())
    }

    fn decode<R: InferRequest>(&self, req: &R, idx: usize) -> Result<Vec<(f32, f32)>, DecodeError> {
        let data = req.output(OUTPUT_NAME)?.as_f32()?;
        let offset = idx * self.channels;
        let slice = data.get(offset..offset + self.channels).ok_or_else(|| {
            DecodeError::Topology(format!("output {OUTPUT_NAME} holds no slot {idx}"))
        })?;
        Ok(slice.chunks_exact(2).map(|p| (p[0], p[1])).collect())
    }
}

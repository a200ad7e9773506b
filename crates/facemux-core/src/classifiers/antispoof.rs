//! Anti-spoofing decoder.

use crate::backend::{ElementType, InferRequest, Model};

use super::{DecodeError, OutputDecoder};

/// Expects a single two-class output; the first class is the
/// probability that the face is a real one, scaled to percent.
#[derive(Debug, Default)]
pub struct AntispoofDecoder {
    output: String,
}

impl AntispoofDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputDecoder for AntispoofDecoder {
    type Output = f32;

    const LABEL: &'static str = "anti-spoofing";

    fn validate<M: Model>(&mut self, model: &mut M) -> Result<(), DecodeError> {
        let outputs = model.info().outputs.clone();
        if outputs.len() != 1 {
            return Err(DecodeError::Topology(format!(
                "expected a single probability output, found {} outputs",
                outputs.len()
            )));
        }
        self.output = outputs[0].name.clone();
        model.set_output_precision(&self.output, ElementType::F32)?;
        Ok(())
    }

    fn decode<R: InferRequest>(&self, req: &R, idx: usize) -> Result<f32, DecodeError> {
        let data = req.output(&self.output)?.as_f32()?;
        let real = data.get(idx * 2).ok_or_else(|| {
            DecodeError::Topology(format!("probability output holds no slot {idx}"))
        })?;
        Ok(real * 100.0)
    }
}

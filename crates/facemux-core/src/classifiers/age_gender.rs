//! Age and gender estimation decoder.

use serde::{Deserialize, Serialize};

use crate::backend::{ElementType, InferRequest, Model};

use super::{DecodeError, OutputDecoder};

/// Estimated age in years and probability that the face is male.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeGender {
    pub age: f32,
    pub male_prob: f32,
}

/// Expects two outputs: normalized age first, the two-class gender
/// probability second.
#[derive(Debug, Default)]
pub struct AgeGenderDecoder {
    age_output: String,
    gender_output: String,
}

impl AgeGenderDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputDecoder for AgeGenderDecoder {
    type Output = AgeGender;

    const LABEL: &'static str = "age/gender";

    fn validate<M: Model>(&mut self, model: &mut M) -> Result<(), DecodeError> {
        let outputs = model.info().outputs.clone();
        if outputs.len() != 2 {
            return Err(DecodeError::Topology(format!(
                "expected an age output and a gender output, found {} outputs",
                outputs.len()
            )));
        }
        self.age_output = outputs[0].name.clone();
        self.gender_output = outputs[1].name.clone();
        model.set_output_precision(&self.age_output, ElementType::F32)?;
        model.set_output_precision(&self.gender_output, ElementType::F32)?;
        Ok(())
    }

    fn decode<R: InferRequest>(&self, req: &R, idx: usize) -> Result<AgeGender, DecodeError> {
        let ages = req.output(&self.age_output)?.as_f32()?;
        let genders = req.output(&self.gender_output)?.as_f32()?;
        let age = ages
            .get(idx)
            .ok_or_else(|| DecodeError::Topology(format!("age output holds no slot {idx}")))?;
        let male_prob = genders
            .get(idx * 2 + 1)
            .ok_or_else(|| DecodeError::Topology(format!("gender output holds no slot {idx}")))?;
        Ok(AgeGender {
            age: age * 100.0,
            male_prob: *male_prob,
        })
    }
}

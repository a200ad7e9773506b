//! Head pose estimation decoder.

use serde::{Deserialize, Serialize};

use crate::backend::{ElementType, InferRequest, Model};

use super::{DecodeError, OutputDecoder};

const OUTPUT_ROLL: &str = "angle_r_fc";
const OUTPUT_PITCH: &str = "angle_p_fc";
const OUTPUT_YAW: &str = "angle_y_fc";

/// Head orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Expects three scalar outputs with the fixed names `angle_r_fc`,
/// `angle_p_fc` and `angle_y_fc`.
#[derive(Debug, Default)]
pub struct HeadPoseDecoder;

impl HeadPoseDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl OutputDecoder for HeadPoseDecoder {
    type Output = HeadPose;

    const LABEL: &'static str = "head pose";

    fn validate<M: Model>(&mut self, model: &mut M) -> Result<(), DecodeError> {
        let outputs = model.info().outputs.clone();
        for name in [OUTPUT_ROLL, OUTPUT_PITCH, OUTPUT_YAW] {
            if !outputs.iter().any(|out| out.name == name) {
                return Err(DecodeError::Topology(format!("missing output {name}")));
            }
            model.set_output_precision(name, ElementType::F32)?;
        }
        Ok(())
    }

    fn decode<R: InferRequest>(&self, req: &R, idx: usize) -> Result<HeadPose, DecodeError> {
        let angle = |name: &str| -> Result<f32, DecodeError> {
            req.output(name)?
                .as_f32()?
                .get(idx)
                .copied()
                .ok_or_else(|| DecodeError::Topology(format!("output {name} holds no slot {idx}")))
        };
        Ok(HeadPose {
            roll: angle(OUTPUT_ROLL)?,
            pitch: angle(OUTPUT_PITCH)?,
            yaw: angle(OUTPUT_YAW)?,
        })
    }
}

//! Emotion recognition decoder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backend::{ElementType, InferRequest, Model};

use super::{DecodeError, OutputDecoder};

/// Default class order of the supported emotion recognition models.
const DEFAULT_VOCAB: [&str; 5] = ["neutral", "happy", "sad", "surprise", "anger"];

/// Per-label emotion probabilities for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotions {
    pub probabilities: BTreeMap<String, f32>,
}

impl Emotions {
    /// Label with the highest probability, if any.
    pub fn top(&self) -> Option<(&str, f32)> {
        self.probabilities
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(label, p)| (label.as_str(), *p))
    }
}

/// Expects a single output whose channel count matches the emotion
/// vocabulary, one probability per class.
#[derive(Debug)]
pub struct EmotionsDecoder {
    output: String,
    vocab: Vec<String>,
}

impl Default for EmotionsDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionsDecoder {
    pub fn new() -> Self {
        Self::with_vocab(DEFAULT_VOCAB.iter().map(|s| s.to_string()).collect())
    }

    /// Use a custom class order, for models trained on other label sets.
    pub fn with_vocab(vocab: Vec<String>) -> Self {
        Self {
            output: String::new(),
            vocab,
        }
    }
}

impl OutputDecoder for EmotionsDecoder {
    type Output = Emotions;

    const LABEL: &'static str = "emotions";

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

    fn decode<R: InferRequest>(&self, req: &R, idx: usize) -> Result<Emotions, DecodeError> {
        let view = req.output(&self.output)?;
        let channels = view.shape.get(1).copied().unwrap_or(0);
        if channels != self.vocab.len() {
            return Err(DecodeError::Topology(format!(
                "output holds {channels} classes, vocabulary has {}",
                self.vocab.len()
            )));
        }
        let data = view.as_f32()?;
        let offset = idx * channels;
        let slice = data.get(offset..offset + channels).ok_or_else(|| {
            DecodeError::Topology(format!("probability output holds no slot {idx}"))
        })?;
        let probabilities = self
            .vocab
            .iter()
            .cloned()
            .zip(slice.iter().copied())
            .collect();
        Ok(Emotions { probabilities })
    }
}

//! Deterministic in-memory compute backend.
//!
//! Implements the `facemux-core` capability traits over canned tensors
//! so the pipeline can run without a real inference runtime. Every
//! backend call is appended to a shared [`Journal`], letting tests
//! assert the scheduling discipline (compile options, effective-batch
//! notifications, run mode) rather than just the decoded values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use facemux_core::backend::{
    Backend, BackendError, CompileOptions, ElementType, Executable, InferRequest, Model,
    ModelInfo, TensorData, TensorDesc, TensorView,
};

/// One backend call, as observed by the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Compiled {
        model: String,
        device: String,
        dynamic_batch: bool,
    },
    BatchSize {
        model: String,
        batch: usize,
    },
    EffectiveBatch {
        model: String,
        batch: usize,
    },
    Started {
        model: String,
    },
    Ran {
        model: String,
    },
    Waited {
        model: String,
    },
}

/// Shared, clonable log of backend calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    fn push(&self, event: Event) {
        self.0.lock().expect("journal lock poisoned").push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().expect("journal lock poisoned").clone()
    }

    pub fn clear(&self) {
        self.0.lock().expect("journal lock poisoned").clear();
    }

    /// Number of journal entries matching `pred`.
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

/// Canned output tensor of a simulated model.
#[derive(Debug, Clone)]
pub struct SimTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: SimData,
}

#[derive(Debug, Clone)]
pub enum SimData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

impl SimTensor {
    fn element_type(&self) -> ElementType {
        match self.data {
            SimData::F32(_) => ElementType::F32,
            SimData::I32(_) => ElementType::I32,
            SimData::U8(_) => ElementType::U8,
        }
    }

    fn view(&self) -> TensorView<'_> {
        TensorView {
            name: &self.name,
            shape: &self.shape,
            data: match &self.data {
                SimData::F32(d) => TensorData::F32(d),
                SimData::I32(d) => TensorData::I32(d),
                SimData::U8(d) => TensorData::U8(d),
            },
        }
    }
}

/// Description of a simulated model: its input ports and the outputs
/// every run of it will produce.
#[derive(Debug, Clone, Default)]
pub struct SimModelSpec {
    inputs: Vec<TensorDesc>,
    outputs: Vec<SimTensor>,
}

impl SimModelSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: &str, shape: &[usize], element_type: ElementType) -> Self {
        self.inputs.push(TensorDesc {
            name: name.to_string(),
            shape: shape.to_vec(),
            element_type,
        });
        self
    }

    pub fn output_f32(mut self, name: &str, shape: &[usize], data: Vec<f32>) -> Self {
        self.outputs.push(SimTensor {
            name: name.to_string(),
            shape: shape.to_vec(),
            data: SimData::F32(data),
        });
        self
    }

    pub fn output_i32(mut self, name: &str, shape: &[usize], data: Vec<i32>) -> Self {
        self.outputs.push(SimTensor {
            name: name.to_string(),
            shape: shape.to_vec(),
            data: SimData::I32(data),
        });
        self
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            inputs: self.inputs.clone(),
            outputs: self
                .outputs
                .iter()
                .map(|t| TensorDesc {
                    name: t.name.clone(),
                    shape: t.shape.clone(),
                    element_type: t.element_type(),
                })
                .collect(),
        }
    }
}

/// In-memory backend serving registered model specs by path.
#[derive(Debug, Default)]
pub struct SimBackend {
    models: HashMap<PathBuf, SimModelSpec>,
    journal: Journal,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `spec` available under `path` for `read_model`.
    pub fn register(&mut self, path: impl Into<PathBuf>, spec: SimModelSpec) {
        self.models.insert(path.into(), spec);
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl Backend for SimBackend {
    type Model = SimModel;
    type Executable = SimExecutable;
    type Request = SimRequest;

    fn read_model(&self, path: &Path) -> Result<SimModel, BackendError> {
        let spec = self
            .models
            .get(path)
            .ok_or_else(|| BackendError::ModelRead {
                path: path.display().to_string(),
                reason: "no such registered model".to_string(),
            })?;
        Ok(SimModel {
            name: path.display().to_string(),
            info: spec.info(),
            outputs: spec.outputs.clone(),
            batch: 1,
            journal: self.journal.clone(),
        })
    }

    fn compile(
        &mut self,
        model: SimModel,
        device: &str,
        options: &CompileOptions,
    ) -> Result<SimExecutable, BackendError> {
        if device.is_empty() {
            return Err(BackendError::Device(device.to_string()));
        }
        self.journal.push(Event::Compiled {
            model: model.name.clone(),
            device: device.to_string(),
            dynamic_batch: options.dynamic_batch,
        });
        debug!(model = %model.name, device, "compiled");
        Ok(SimExecutable {
            name: model.name,
            info: model.info,
            outputs: model.outputs,
            batch: model.batch,
            dynamic_batch: options.dynamic_batch,
            journal: self.journal.clone(),
        })
    }
}

#[derive(Debug)]
pub struct SimModel {
    name: String,
    info: ModelInfo,
    outputs: Vec<SimTensor>,
    batch: usize,
    journal: Journal,
}

impl Model for SimModel {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn set_batch_size(&mut self, batch: usize) {
        self.batch = batch;
        self.journal.push(Event::BatchSize {
            model: self.name.clone(),
            batch,
        });
    }

    fn set_input_precision(&mut self, name: &str, ty: ElementType) -> Result<(), BackendError> {
        let input = self
            .info
            .inputs
            .iter_mut()
            .find(|i| i.name == name)
            .ok_or_else(|| BackendError::NoSuchTensor(name.to_string()))?;
        input.element_type = ty;
        Ok(())
    }

    fn set_output_precision(&mut self, name: &str, ty: ElementType) -> Result<(), BackendError> {
        self.info
            .outputs
            .iter_mut()
            .find(|o| o.name == name)
            .map(|o| o.element_type = ty)
            .ok_or_else(|| BackendError::NoSuchTensor(name.to_string()))
    }
}

#[derive(Debug)]
pub struct SimExecutable {
    name: String,
    info: ModelInfo,
    outputs: Vec<SimTensor>,
    batch: usize,
    dynamic_batch: bool,
    journal: Journal,
}

impl Executable for SimExecutable {
    type Request = SimRequest;

    fn create_request(&self) -> Result<SimRequest, BackendError> {
        Ok(SimRequest {
            name: self.name.clone(),
            info: self.info.clone(),
            outputs: self.outputs.clone(),
            batch: self.batch,
            dynamic_batch: self.dynamic_batch,
            in_flight: false,
            done: false,
            journal: self.journal.clone(),
        })
    }
}

#[derive(Debug)]
pub struct SimRequest {
    name: String,
    info: ModelInfo,
    outputs: Vec<SimTensor>,
    batch: usize,
    dynamic_batch: bool,
    in_flight: bool,
    done: bool,
    journal: Journal,
}

impl InferRequest for SimRequest {
    fn bind_input(&mut self, name: &str, slot: usize, _data: &[u8]) -> Result<(), BackendError> {
        if !self.info.inputs.iter().any(|i| i.name == name) {
            return Err(BackendError::NoSuchTensor(name.to_string()));
        }
        if slot >= self.batch {
            return Err(BackendError::SlotOutOfRange {
                slot,
                batch: self.batch,
            });
        }
        self.done = false;
        Ok(())
    }

    fn set_effective_batch(&mut self, batch: usize) -> Result<(), BackendError> {
        if !self.dynamic_batch {
            return Err(BackendError::Other(
                "dynamic batch not enabled for this executable".to_string(),
            ));
        }
        self.journal.push(Event::EffectiveBatch {
            model: self.name.clone(),
            batch,
        });
        Ok(())
    }

    fn run(&mut self) -> Result<(), BackendError> {
        self.in_flight = false;
        self.done = true;
        self.journal.push(Event::Ran {
            model: self.name.clone(),
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.in_flight = true;
        self.done = false;
        self.journal.push(Event::Started {
            model: self.name.clone(),
        });
        Ok(())
    }

    fn wait(&mut self) -> Result<(), BackendError> {
        if !self.in_flight {
            return Err(BackendError::NothingInFlight);
        }
        self.in_flight = false;
        self.done = true;
        self.journal.push(Event::Waited {
            model: self.name.clone(),
        });
        Ok(())
    }

    fn output(&self, name: &str) -> Result<TensorView<'_>, BackendError> {
        if !self.done {
            return Err(BackendError::ResultsNotReady);
        }
        self.outputs
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.view())
            .ok_or_else(|| BackendError::NoSuchTensor(name.to_string()))
    }
}

//! Compute-backend capability interface.
//!
//! The pipeline core never talks to a concrete inference runtime. It
//! drives any backend through the narrow surface below: read a model,
//! compile it for a device, create a request, bind inputs, run, read
//! output tensors. `facemux-sim` implements these traits in memory for
//! tests; a hardware adapter crate implements them over a real runtime.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to read model {path}: {reason}")]
    ModelRead { path: String, reason: String },
    #[error("device {0} is not available")]
    Device(String),
    #[error("no tensor named {0}")]
    NoSuchTensor(String),
    #[error("tensor {name} holds {actual:?} data, expected {expected:?}")]
    TypeMismatch {
        name: String,
        expected: ElementType,
        actual: ElementType,
    },
    #[error("batch slot {slot} is out of range (batch size {batch})")]
    SlotOutOfRange { slot: usize, batch: usize },
    #[error("request results are not available yet")]
    ResultsNotReady,
    #[error("no inference is in flight on this request")]
    NothingInFlight,
    #[error("{0}")]
    Other(String),
}

/// Element type of a tensor port or view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    U8,
    F32,
    I32,
}

/// Static description of one input or output port.
#[derive(Debug, Clone)]
pub struct TensorDesc {
    pub name: String,
    /// Port shape with the batch dimension first (e.g. `[N, C, H, W]`).
    pub shape: Vec<usize>,
    pub element_type: ElementType,
}

impl TensorDesc {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Input and output ports of a loaded model, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ModelInfo {
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
}

/// Options applied when compiling a model for a device.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Allow the effective batch to be shrunk per request.
    pub dynamic_batch: bool,
}

/// Borrowed view over one output tensor.
///
/// Valid only until the owning request is staged or run again; results
/// are transient, never retained across frames.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub name: &'a str,
    pub shape: &'a [usize],
    pub data: TensorData<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum TensorData<'a> {
    F32(&'a [f32]),
    I32(&'a [i32]),
    U8(&'a [u8]),
}

impl<'a> TensorView<'a> {
    pub fn element_type(&self) -> ElementType {
        match self.data {
            TensorData::F32(_) => ElementType::F32,
            TensorData::I32(_) => ElementType::I32,
            TensorData::U8(_) => ElementType::U8,
        }
    }

    pub fn len(&self) -> usize {
        match self.data {
            TensorData::F32(d) => d.len(),
            TensorData::I32(d) => d.len(),
            TensorData::U8(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Result<&'a [f32], BackendError> {
        match self.data {
            TensorData::F32(d) => Ok(d),
            _ => Err(BackendError::TypeMismatch {
                name: self.name.to_string(),
                expected: ElementType::F32,
                actual: self.element_type(),
            }),
        }
    }

    pub fn as_i32(&self) -> Result<&'a [i32], BackendError> {
        match self.data {
            TensorData::I32(d) => Ok(d),
            _ => Err(BackendError::TypeMismatch {
                name: self.name.to_string(),
                expected: ElementType::I32,
                actual: self.element_type(),
            }),
        }
    }
}

/// Entry point of a compute backend: model reading and compilation.
pub trait Backend {
    type Model: Model;
    type Executable: Executable<Request = Self::Request>;
    type Request: InferRequest;

    /// Read a model from `path`, exposing its ports for validation.
    fn read_model(&self, path: &Path) -> Result<Self::Model, BackendError>;

    /// Compile a prepared model for `device`.
    fn compile(
        &mut self,
        model: Self::Model,
        device: &str,
        options: &CompileOptions,
    ) -> Result<Self::Executable, BackendError>;
}

/// A read-but-not-yet-compiled model.
pub trait Model {
    fn info(&self) -> &ModelInfo;

    /// Fix the maximum batch size before compilation.
    fn set_batch_size(&mut self, batch: usize);

    fn set_input_precision(&mut self, name: &str, ty: ElementType) -> Result<(), BackendError>;
    fn set_output_precision(&mut self, name: &str, ty: ElementType) -> Result<(), BackendError>;
}

/// A model compiled for a device; a factory for inference requests.
pub trait Executable {
    type Request: InferRequest;

    fn create_request(&self) -> Result<Self::Request, BackendError>;
}

/// One reusable inference request.
///
/// Lifecycle: bind inputs slot by slot, then either `run` (blocking) or
/// `start` followed by `wait`. Outputs are readable only after the run
/// completed and remain valid until the request is staged again.
pub trait InferRequest {
    /// Stage `data` into batch slot `slot` of input `name`.
    fn bind_input(&mut self, name: &str, slot: usize, data: &[u8]) -> Result<(), BackendError>;

    /// Tell the backend how many batch slots are actually filled, so
    /// unused slots are not computed. Only legal when the executable was
    /// compiled with [`CompileOptions::dynamic_batch`].
    fn set_effective_batch(&mut self, batch: usize) -> Result<(), BackendError>;

    /// Run to completion on the calling thread.
    fn run(&mut self) -> Result<(), BackendError>;

    /// Dispatch to the backend's internal execution and return.
    fn start(&mut self) -> Result<(), BackendError>;

    /// Block until a dispatched run has completed.
    fn wait(&mut self) -> Result<(), BackendError>;

    fn output(&self, name: &str) -> Result<TensorView<'_>, BackendError>;
}

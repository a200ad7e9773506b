//! Minimal backend stand-ins for unit tests that never run inference.

use std::path::Path;

use crate::backend::{
    Backend, BackendError, CompileOptions, ElementType, Executable, InferRequest, Model,
    ModelInfo, TensorView,
};

pub struct NullBackend;

pub struct NullModel(ModelInfo);

pub struct NullExecutable;

pub struct NullRequest;

impl Backend for NullBackend {
    type Model = NullModel;
    type Executable = NullExecutable;
    type Request = NullRequest;

    fn read_model(&self, _path: &Path) -> Result<NullModel, BackendError> {
        Ok(NullModel(ModelInfo::default()))
    }

    fn compile(
        &mut self,
        _model: NullModel,
        _device: &str,
        _options: &CompileOptions,
    ) -> Result<NullExecutable, BackendError> {
        Ok(NullExecutable)
    }
}

impl Model for NullModel {
    fn info(&self) -> &ModelInfo {
        &self.0
    }

    fn set_batch_size(&mut self, _batch: usize) {}

    fn set_input_precision(&mut self, _name: &str, _ty: ElementType) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_output_precision(&mut self, _name: &str, _ty: ElementType) -> Result<(), BackendError> {
        Ok(())
    }
}

impl Executable for NullExecutable {
    type Request = NullRequest;

    fn create_request(&self) -> Result<NullRequest, BackendError> {
        Ok(NullRequest)
    }
}

impl InferRequest for NullRequest {
    fn bind_input(&mut self, _name: &str, _slot: usize, _data: &[u8]) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_effective_batch(&mut self, _batch: usize) -> Result<(), BackendError> {
        Ok(())
    }

    fn run(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn wait(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn output(&self, name: &str) -> Result<TensorView<'_>, BackendError> {
        Err(BackendError::NoSuchTensor(name.to_string()))
    }
}

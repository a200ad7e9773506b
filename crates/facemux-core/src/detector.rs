//! Shared per-detector state: configuration, the compiled executable,
//! and the single reusable inference request with its lifecycle.

use std::cell::OnceCell;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::backend::{Backend, BackendError, Executable, InferRequest};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{label}: a request is already in flight")]
    RequestInFlight { label: String },
    #[error("{label}: results requested before the request completed")]
    NotReady { label: String },
    #[error("{label}: model topology mismatch: {reason}")]
    InvalidTopology { label: String, reason: String },
    #[error("{label}: result index {index} out of range ({count} enqueued)")]
    BadIndex {
        label: String,
        index: usize,
        count: usize,
    },
}

/// Per-detector settings, deserializable from a config file section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Path to the model. Empty disables the detector entirely.
    pub model_path: PathBuf,
    /// Largest number of inputs staged into one request.
    pub max_batch: usize,
    /// Dispatch requests without blocking; results come via `wait`.
    pub run_async: bool,
    /// Log every decoded result instead of drawing conclusions silently.
    pub raw_output: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            max_batch: 1,
            run_async: false,
            raw_output: false,
        }
    }
}

impl DetectorConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Self::default()
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    pub fn with_async(mut self, run_async: bool) -> Self {
        self.run_async = run_async;
        self
    }

    pub fn with_raw_output(mut self, raw_output: bool) -> Self {
        self.raw_output = raw_output;
        self
    }
}

/// Where the detector's single request currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// No results pending; inputs may be staged.
    Idle,
    /// Dispatched asynchronously and not yet waited on.
    InFlight,
    /// Completed; outputs are readable until the next staging.
    Ready,
}

/// State shared by every detector: the config, the compiled executable,
/// and one lazily created request driven through [`RequestState`].
pub struct DetectorCore<B: Backend> {
    config: DetectorConfig,
    label: &'static str,
    exe: Option<B::Executable>,
    request: Option<B::Request>,
    state: RequestState,
    /// Whether the executable was actually compiled with dynamic batch,
    /// which can differ from what the config asked for.
    dynamic_batch: bool,
    enabled: OnceCell<bool>,
}

impl<B: Backend> DetectorCore<B> {
    pub fn new(config: DetectorConfig, label: &'static str) -> Self {
        Self {
            config,
            label,
            exe: None,
            request: None,
            state: RequestState::Idle,
            dynamic_batch: false,
            enabled: OnceCell::new(),
        }
    }

    /// Whether this detector participates in the pipeline at all.
    ///
    /// Decided once from the configured model path and memoized; later
    /// config changes do not revive a detector already seen as disabled.
    pub fn enabled(&self) -> bool {
        *self.enabled.get_or_init(|| {
            let on = !self.config.model_path.as_os_str().is_empty();
            if !on {
                info!(detector = self.label, "disabled (no model path)");
            }
            on
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DetectorConfig {
        &mut self.config
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn dynamic_batch(&self) -> bool {
        self.dynamic_batch
    }

    /// Adopt a freshly compiled executable. `dynamic_batch` records the
    /// mode the executable really has, not the one that was requested.
    pub fn attach(&mut self, exe: B::Executable, dynamic_batch: bool) {
        self.exe = Some(exe);
        self.request = None;
        self.state = RequestState::Idle;
        self.dynamic_batch = dynamic_batch;
    }

    /// Borrow the request for staging new inputs.
    ///
    /// Creates it on first use. Fails while a run is in flight; a
    /// completed run is reset so its outputs are dropped.
    pub fn ensure_request(&mut self) -> Result<&mut B::Request, DetectorError> {
        match self.state {
            RequestState::InFlight => {
                return Err(DetectorError::RequestInFlight {
                    label: self.label.to_string(),
                })
            }
            RequestState::Ready => self.state = RequestState::Idle,
            RequestState::Idle => {}
        }
        match &mut self.request {
            Some(req) => Ok(req),
            slot @ None => {
                let exe = self.exe.as_ref().ok_or_else(|| {
                    BackendError::Other(format!("{} has no compiled model", self.label))
                })?;
                Ok(slot.insert(exe.create_request()?))
            }
        }
    }

    /// Borrow the request for reading outputs of a completed run.
    pub fn ready_request(&self) -> Result<&B::Request, DetectorError> {
        if self.state != RequestState::Ready {
            return Err(DetectorError::NotReady {
                label: self.label.to_string(),
            });
        }
        match &self.request {
            Some(req) => Ok(req),
            None => Err(DetectorError::NotReady {
                label: self.label.to_string(),
            }),
        }
    }

    /// Execute the staged inputs, synchronously or asynchronously per
    /// the config. A no-op when the detector is disabled or nothing has
    /// been staged yet.
    pub fn submit(&mut self) -> Result<(), DetectorError> {
        if !self.enabled() {
            return Ok(());
        }
        let Some(req) = &mut self.request else {
            return Ok(());
        };
        match self.state {
            RequestState::InFlight => {
                return Err(DetectorError::RequestInFlight {
                    label: self.label.to_string(),
                })
            }
            RequestState::Idle | RequestState::Ready => {}
        }
        if self.config.run_async {
            req.start()?;
            self.state = RequestState::InFlight;
        } else {
            req.run()?;
            self.state = RequestState::Ready;
        }
        Ok(())
    }

    /// Block until an in-flight run completes. A no-op for synchronous
    /// detectors and when nothing is in flight.
    pub fn wait(&mut self) -> Result<(), DetectorError> {
        if !self.enabled() || !self.config.run_async {
            return Ok(());
        }
        if self.state != RequestState::InFlight {
            return Ok(());
        }
        let Some(req) = &mut self.request else {
            return Ok(());
        };
        req.wait()?;
        self.state = RequestState::Ready;
        Ok(())
    }

    pub(crate) fn topology_error(&self, reason: impl Into<String>) -> DetectorError {
        DetectorError::InvalidTopology {
            label: self.label.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_index(&self, index: usize, count: usize) -> DetectorError {
        DetectorError::BadIndex {
            label: self.label.to_string(),
            index,
            count,
        }
    }
}

/// Common surface every detector exposes over its [`DetectorCore`].
pub trait Detector<B: Backend> {
    fn core(&self) -> &DetectorCore<B>;

    fn core_mut(&mut self) -> &mut DetectorCore<B>;

    /// Read and validate the model, fixing port precisions and
    /// recording the names this detector binds and decodes by. Returns
    /// the prepared model for the loader to compile.
    fn read(&mut self, backend: &B) -> Result<B::Model, DetectorError>;

    fn enabled(&self) -> bool {
        self.core().enabled()
    }

    fn submit(&mut self) -> Result<(), DetectorError> {
        self.core_mut().submit()
    }

    fn wait(&mut self) -> Result<(), DetectorError> {
        self.core_mut().wait()
    }
}

//! Load orchestration: reads, compiles and attaches detector models.

use tracing::info;

use crate::backend::{Backend, CompileOptions};
use crate::detector::{Detector, DetectorError};

/// Whether `device` can shrink the effective batch per request.
pub fn supports_dynamic_batch(device: &str) -> bool {
    device.contains("CPU") || device.contains("GPU")
}

/// Read and compile `detector`'s model for `device`, then attach the
/// executable. A no-op for disabled detectors.
///
/// Dynamic batching takes effect only when requested and supported by
/// the device; the reconciled mode is recorded on the detector core.
pub fn load<B: Backend, D: Detector<B>>(
    detector: &mut D,
    backend: &mut B,
    device: &str,
    enable_dynamic_batch: bool,
) -> Result<(), DetectorError> {
    if !detector.enabled() {
        return Ok(());
    }
    let model = detector.read(backend)?;
    let dynamic_batch = enable_dynamic_batch && supports_dynamic_batch(device);
    let exe = backend.compile(model, device, &CompileOptions { dynamic_batch })?;
    let core = detector.core_mut();
    core.attach(exe, dynamic_batch);
    info!(
        detector = core.label(),
        device,
        dynamic_batch,
        max_batch = core.config().max_batch,
        "model loaded"
    );
    Ok(())
}

//! Orchestration core of the facemux face-analytics pipeline.
//!
//! A primary face detector finds faces in full frames and feeds square
//! crops into independent secondary classifiers (age/gender, head pose,
//! emotions, facial landmarks, anti-spoofing). Each model wrapper owns
//! its batching and its single-request lifecycle, run synchronously or
//! asynchronously against a pluggable compute backend reached through
//! the capability traits in [`backend`].
//!
//! Typical frame loop:
//!
//! 1. `FaceDetector::enqueue` the frame, `submit`, `wait`,
//!    `fetch_results`.
//! 2. Crop each detection, `enqueue` the crops into the classifiers,
//!    `submit` each batch, `wait`.
//! 3. Read classifier results per face with `result(idx)`.

pub mod backend;
pub mod classifiers;
pub mod detector;
pub mod face;
pub mod frame;
pub mod loader;
pub mod perf;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use detector::{Detector, DetectorConfig, DetectorCore, DetectorError, RequestState};
pub use face::{FaceDetector, FaceDetectorConfig};
pub use frame::{Frame, FrameError};
pub use loader::load;
pub use perf::{CallStat, Timer};
pub use types::{Detection, FaceRect};

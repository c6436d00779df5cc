//! Audio-reactive signal pipeline.
//!
//! Taps a playing media element or a live capture device, measures the
//! energy of one frequency band on every display frame, smooths it, and
//! publishes it as a single scalar in [0, 1] for presentation code to read.
//!
//! ```text
//! SignalSource -> AnalysisContext -> EnergyBand -> Smoother -> ParamWriter
//!                                    (per frame, driven by ReactiveLoop)
//! ```

pub mod analysis;
pub mod config;
pub mod energy;
pub mod error;
pub mod host;
pub mod param;
pub mod pipeline;
pub mod reactive;
pub mod smoother;
pub mod source;

#[cfg(test)]
mod test_support;

pub use analysis::{AnalysisContext, FftSize};
pub use config::{ListenConfig, ReactiveConfig};
pub use energy::{extract, EnergyBand};
pub use error::{AttachError, ConfigError, FrameError};
pub use host::{AudioHost, CpalHost};
pub use param::{react_param, ParamReader, ParamWriter};
pub use pipeline::{AttachHandle, AudioReactive, StartIntent};
pub use reactive::{FrameScheduler, ReactiveLoop, RunState, TickOutcome};
pub use smoother::{step, Smoother};
pub use source::{ElementId, MediaElement, SampleTap, SignalSource, SourceKind};

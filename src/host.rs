//! Platform audio services: capture devices and graph admission.

use crate::error::AttachError;
use crate::source::{start_capture, CaptureStream, SampleTap};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, StreamError};
use log::{info, warn};

/// What the pipeline needs from the platform.
pub trait AudioHost {
    /// Open the default input device and stream mono samples into `tap`.
    fn open_capture(&self, tap: SampleTap) -> Result<Box<dyn CaptureStream>, AttachError>;

    /// Allow an analysis graph to be built, returning its sample rate.
    ///
    /// Returns `GraphConstructionFailed` when the platform refuses.
    fn admit_graph(&self) -> Result<u32, AttachError>;
}

/// [`AudioHost`] backed by the default cpal host.
#[derive(Default)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }
}

impl AudioHost for CpalHost {
    fn open_capture(&self, tap: SampleTap) -> Result<Box<dyn CaptureStream>, AttachError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AttachError::DeviceUnavailable("no input device available".into()))?;

        info!("Capturing from: {}", device.name().unwrap_or_default());

        let supported = device
            .default_input_config()
            .map_err(|e| AttachError::DeviceUnavailable(e.to_string()))?;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.into();

        let data_tap = tap.clone();
        let error_tap = tap;
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    data_tap.push_interleaved(data, channels);
                },
                move |err| match err {
                    StreamError::DeviceNotAvailable => {
                        warn!("Input device disappeared");
                        error_tap.release();
                    }
                    other => warn!("Audio input error: {other}"),
                },
                None,
            )
            .map_err(classify_build_error)?;

        start_capture(Box::new(CpalCapture {
            stream: Some(stream),
        }))
    }

    fn admit_graph(&self) -> Result<u32, AttachError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            AttachError::GraphConstructionFailed("no output device available".into())
        })?;
        let config = device
            .default_output_config()
            .map_err(|e| AttachError::GraphConstructionFailed(e.to_string()))?;
        Ok(config.sample_rate().0)
    }
}

struct CpalCapture {
    stream: Option<cpal::Stream>,
}

impl CaptureStream for CpalCapture {
    fn start(&mut self) -> Result<(), AttachError> {
        let stream = self.stream.as_ref().ok_or_else(|| {
            AttachError::DeviceUnavailable("capture stream already stopped".into())
        })?;
        stream
            .play()
            .map_err(|e| AttachError::DeviceUnavailable(e.to_string()))
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause input stream: {e}");
            }
        }
    }
}

/// Map cpal's build failure onto the attach taxonomy.
fn classify_build_error(err: BuildStreamError) -> AttachError {
    match err {
        BuildStreamError::BackendSpecific { err } if is_permission_message(&err.description) => {
            AttachError::PermissionDenied(err.description)
        }
        other => AttachError::DeviceUnavailable(other.to_string()),
    }
}

fn is_permission_message(description: &str) -> bool {
    let lower = description.to_lowercase();
    ["permission", "denied", "not authorized", "not permitted"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Log available input devices so the user knows what's there.
pub fn list_input_devices() {
    let host = cpal::default_host();
    info!("Available input devices:");
    if let Ok(devices) = host.input_devices() {
        for (i, device) in devices.enumerate() {
            if let Ok(name) = device.name() {
                info!("  [{}] {}", i, name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_messages_are_recognised() {
        assert!(is_permission_message("Microphone access DENIED by user"));
        assert!(is_permission_message("App is not authorized to record"));
        assert!(!is_permission_message("device busy"));
    }

    #[test]
    fn test_backend_permission_error_maps_to_permission_denied() {
        let err = BuildStreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "permission denied".into(),
            },
        };
        assert_eq!(
            classify_build_error(err),
            AttachError::PermissionDenied("permission denied".into())
        );
    }

    #[test]
    fn test_missing_device_maps_to_unavailable() {
        assert!(matches!(
            classify_build_error(BuildStreamError::DeviceNotAvailable),
            AttachError::DeviceUnavailable(_)
        ));
    }
}

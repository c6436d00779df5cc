use thiserror::Error;

/// Why a source could not be attached to the analysis graph.
///
/// Attachment failures never disturb playback: the caller may keep audio
/// running with no visual reactivity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("Permission to use the input device was denied: {0}")]
    PermissionDenied(String),

    #[error("Input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Analysis graph could not be built: {0}")]
    GraphConstructionFailed(String),

    #[error("Media element is already tapped by another pipeline")]
    AlreadyAttachedElsewhere,
}

/// Failure while reading one analysis frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Skip this frame and keep going.
    #[error("Frame read failed: {0}")]
    TransientFrameReadFailure(String),

    /// The attached source is gone for good.
    #[error("Signal source was released")]
    SourceReleased,
}

/// Invalid configuration values or an unreadable data file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Band must satisfy 0 <= start < end <= 1, got [{start}, {end})")]
    InvalidBand { start: f32, end: f32 },

    #[error("Normalisation span must be finite and positive, got {0}")]
    InvalidSpan(f32),

    #[error("Smoother retain factor must be within [0, 1], got {0}")]
    InvalidRetain(f32),

    #[error("Analyser smoothing must be within [0, 1], got {0}")]
    InvalidSmoothing(f32),

    #[error("Failed to read data file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse data file: {0}")]
    Json(#[from] serde_json::Error),
}

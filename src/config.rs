//! Pipeline tuning and the listen settings read from the site data file.

use crate::analysis::{FftSize, DEFAULT_SMOOTHING_TIME_CONSTANT};
use crate::energy::EnergyBand;
use crate::error::ConfigError;
use crate::smoother::{Smoother, DEFAULT_RETAIN};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fixed per-pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactiveConfig {
    pub fft_size: FftSize,
    /// Analyser time smoothing (0 = none, 1 = frozen).
    pub analyser_smoothing: f32,
    pub band: EnergyBand,
    /// Smoother retain factor; the input weight is `1 - retain`.
    pub retain: f32,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            fft_size: FftSize::N2048,
            analyser_smoothing: DEFAULT_SMOOTHING_TIME_CONSTANT,
            band: EnergyBand::LOW_MID,
            retain: DEFAULT_RETAIN,
        }
    }
}

impl ReactiveConfig {
    pub fn with_band(mut self, band: EnergyBand) -> Self {
        self.band = band;
        self
    }

    pub fn with_fft_size(mut self, fft_size: FftSize) -> Self {
        self.fft_size = fft_size;
        self
    }

    pub fn smoother(&self) -> Result<Smoother, ConfigError> {
        Smoother::with_retain(self.retain)
    }

    /// Analyser time smoothing, checked to lie in [0, 1].
    pub fn analyser_smoothing(&self) -> Result<f32, ConfigError> {
        if !(0.0..=1.0).contains(&self.analyser_smoothing) {
            return Err(ConfigError::InvalidSmoothing(self.analyser_smoothing));
        }
        Ok(self.analyser_smoothing)
    }
}

/// Optional listen settings under `profile` in the data file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Path or URL of the playable asset. Missing or blank disables listening.
    #[serde(default)]
    pub audio_src: Option<String>,
    /// Playback volume in [0, 1].
    #[serde(default)]
    pub audio_volume: Option<f32>,
}

#[derive(Deserialize)]
struct DataFile {
    #[serde(default)]
    profile: ListenConfig,
}

impl ListenConfig {
    /// Parse the `profile` section of a data file document.
    pub fn from_data_json(json: &str) -> Result<Self, ConfigError> {
        let data: DataFile = serde_json::from_str(json)?;
        Ok(data.profile)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_data_json(&contents)?;
        info!(
            "Loaded listen config from {} (enabled: {})",
            path.display(),
            config.is_enabled()
        );
        Ok(config)
    }

    /// Whether the listen feature exists at all. When false, the listen
    /// control should be hidden.
    pub fn is_enabled(&self) -> bool {
        self.source().is_some()
    }

    pub fn source(&self) -> Option<&str> {
        self.audio_src
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn volume(&self) -> f32 {
        match self.audio_volume {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => 1.0,
        }
    }

    /// Resolve the source against the data file's directory.
    pub fn resolve_src(&self, base_dir: &Path) -> Option<PathBuf> {
        let src = self.source()?;
        let src = src.strip_prefix("./").unwrap_or(src);
        let path = Path::new(src);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(base_dir.join(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_reactive_config() {
        let config = ReactiveConfig::default();
        assert_eq!(config.fft_size, FftSize::N2048);
        assert_eq!(config.band, EnergyBand::LOW_MID);
        assert_eq!(config.analyser_smoothing, 0.85);
        assert_eq!(config.smoother().unwrap().retain(), 0.92);
    }

    #[test]
    fn test_profile_fields_are_read() {
        let json = r#"{
            "profile": { "name": "Nico", "audio_src": "./audio/loop.wav", "audio_volume": 0.4 },
            "links": []
        }"#;
        let config = ListenConfig::from_data_json(json).unwrap();
        assert!(config.is_enabled());
        assert_eq!(config.source(), Some("./audio/loop.wav"));
        assert_eq!(config.volume(), 0.4);
        assert_eq!(
            config.resolve_src(Path::new("/srv/site")),
            Some(PathBuf::from("/srv/site/audio/loop.wav"))
        );
    }

    #[test]
    fn test_missing_or_blank_source_disables() {
        assert!(!ListenConfig::from_data_json("{}").unwrap().is_enabled());
        assert!(!ListenConfig::from_data_json(r#"{"profile": {}}"#)
            .unwrap()
            .is_enabled());
        let blank = ListenConfig::from_data_json(r#"{"profile": {"audio_src": "   "}}"#).unwrap();
        assert!(!blank.is_enabled());
        assert_eq!(blank.resolve_src(Path::new(".")), None);
    }

    #[test]
    fn test_volume_defaults_and_clamps() {
        let mut config = ListenConfig::default();
        assert_eq!(config.volume(), 1.0);
        config.audio_volume = Some(3.0);
        assert_eq!(config.volume(), 1.0);
        config.audio_volume = Some(-0.5);
        assert_eq!(config.volume(), 0.0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"profile": {{"audio_src": "song.wav"}}}}"#).unwrap();
        let config = ListenConfig::load(file.path()).unwrap();
        assert_eq!(config.source(), Some("song.wav"));
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(matches!(
            ListenConfig::from_data_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            ListenConfig::load(Path::new("/definitely/not/here.json")),
            Err(ConfigError::Io(_))
        ));
    }
}

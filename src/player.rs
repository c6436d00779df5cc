//! WAV playback element for the demo application.
//!
//! Plays a file through the default output device and reports what it
//! played to its [`MediaElement`], so the pipeline can tap it without
//! touching the audible path.

use audio_reactive::MediaElement;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("{0} contains no audio")]
    Empty(String),

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Output stream error: {0}")]
    Stream(String),
}

pub struct Player {
    element: Arc<MediaElement>,
    stream: cpal::Stream,
}

impl Player {
    /// Decode `path` and prepare a looping, initially paused output stream.
    pub fn open(path: &Path, volume: f32) -> Result<Self, PlayerError> {
        let display = path.display().to_string();
        let decode_err = |source| PlayerError::Decode {
            path: display.clone(),
            source,
        };

        // ---- decode the WAV file ----
        let mut reader = hound::WavReader::open(path).map_err(&decode_err)?;
        let spec = reader.spec();
        info!(
            "Loaded: {} ({}Hz, {} ch, {:?})",
            display, spec.sample_rate, spec.channels, spec.sample_format
        );

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<f32>, _>>(),
            hound::SampleFormat::Int => match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
                    .collect::<Result<Vec<f32>, _>>(),
                24 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / 8_388_607.0))
                    .collect::<Result<Vec<f32>, _>>(),
                _ => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / i32::MAX as f32))
                    .collect::<Result<Vec<f32>, _>>(),
            },
        }
        .map_err(&decode_err)?;

        let src_channels = (spec.channels as usize).max(1);
        if samples.len() < src_channels {
            return Err(PlayerError::Empty(display));
        }

        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let element = MediaElement::new();

        // ---- set up cpal output stream ----
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PlayerError::NoOutputDevice)?;

        let out_supported = device
            .default_output_config()
            .map_err(|e| PlayerError::Stream(e.to_string()))?;
        let dst_channels = out_supported.channels() as usize;

        // Use the file's sample rate so pitch is correct.
        let config = cpal::StreamConfig {
            channels: dst_channels as u16,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let element_c = element.clone();
        let volume = volume.clamp(0.0, 1.0);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !element_c.is_playing() {
                        data.fill(0.0);
                        return;
                    }

                    let mut pos = position.load(Ordering::Relaxed);
                    let total = samples.len();
                    let frames_needed = data.len() / dst_channels;
                    let mut mono_samples: Vec<f32> = Vec::with_capacity(frames_needed);

                    for frame in 0..frames_needed {
                        // Loop back to the start at the end of the file
                        if pos + src_channels > total {
                            pos = 0;
                        }

                        let mono: f32 = (0..src_channels)
                            .map(|ch| samples[pos + ch])
                            .sum::<f32>()
                            / src_channels as f32;
                        mono_samples.push(mono * volume);

                        // The only write to the speakers; the tap gets a copy.
                        for ch in 0..dst_channels {
                            data[frame * dst_channels + ch] =
                                samples[pos + (ch % src_channels)] * volume;
                        }

                        pos += src_channels;
                    }

                    position.store(pos, Ordering::Relaxed);
                    element_c.render(&mono_samples);
                },
                |err| warn!("Audio output error: {err}"),
                None,
            )
            .map_err(|e| PlayerError::Stream(e.to_string()))?;

        // Some backends start streams on creation.
        if let Err(e) = stream.pause() {
            warn!("Could not pause new output stream: {e}");
        }

        Ok(Self { element, stream })
    }

    pub fn element(&self) -> &Arc<MediaElement> {
        &self.element
    }

    pub fn play(&self) -> Result<(), PlayerError> {
        self.stream
            .play()
            .map_err(|e| PlayerError::Stream(e.to_string()))?;
        self.element.set_playing(true);
        Ok(())
    }

    pub fn pause(&self) {
        self.element.set_playing(false);
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause output stream: {e}");
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.element.close();
    }
}

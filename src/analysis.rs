//! The analysis graph: an analyser node fed by the attached source.

use crate::error::{AttachError, FrameError};
use crate::host::AudioHost;
use crate::source::{SampleTap, SignalSource, TapReadError};
use log::debug;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::sync::Arc;

/// Analyser dB range mapped onto 0..=255.
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Default analyser time smoothing, separate from the application smoother.
pub const DEFAULT_SMOOTHING_TIME_CONSTANT: f32 = 0.85;

/// Transform size of the analyser. Chosen once per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftSize {
    N1024,
    #[default]
    N2048,
}

impl FftSize {
    pub fn samples(self) -> usize {
        match self {
            FftSize::N1024 => 1024,
            FftSize::N2048 => 2048,
        }
    }

    /// Number of frequency bins per frame.
    pub fn bin_count(self) -> usize {
        self.samples() / 2
    }
}

/// Byte-frequency analyser: windowed FFT, time smoothing, dB to byte mapping.
pub struct Analyser {
    fft: Arc<dyn rustfft::Fft<f32>>,
    size: usize,
    smoothing: f32,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl Analyser {
    pub fn new(size: FftSize, smoothing: f32) -> Self {
        let size = size.samples();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();

        // Blackman window (alpha = 0.16)
        let window: Vec<f32> = (0..size)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            fft,
            size,
            smoothing: smoothing.clamp(0.0, 1.0),
            window,
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            buffer: vec![Complex::new(0.0, 0.0); size],
            smoothed: vec![0.0; size / 2],
            bytes: vec![0; size / 2],
        }
    }

    /// Process the most recent `size` samples into a byte frame.
    ///
    /// `samples` shorter than the transform are zero-padded at the end.
    pub fn process(&mut self, samples: &[f32]) -> &[u8] {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let tau = self.smoothing;
        let scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);
        for (k, (smoothed, byte)) in self
            .smoothed
            .iter_mut()
            .zip(self.bytes.iter_mut())
            .enumerate()
        {
            let magnitude = self.buffer[k].norm() / self.size as f32;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
            let db = 20.0 * smoothed.log10();
            *byte = (scale * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8;
        }

        &self.bytes
    }

    pub fn bin_count(&self) -> usize {
        self.size / 2
    }
}

struct Graph {
    analyser: Analyser,
    sample_rate: u32,
    input: Option<SampleTap>,
    samples: Vec<f32>,
}

/// Owns the lazily built analysis graph and its current input.
pub struct AnalysisContext {
    fft_size: FftSize,
    smoothing: f32,
    graph: Option<Graph>,
}

impl AnalysisContext {
    pub fn new(fft_size: FftSize, smoothing: f32) -> Self {
        Self {
            fft_size,
            smoothing,
            graph: None,
        }
    }

    /// Build the graph if it doesn't exist yet.
    pub fn ensure<H: AudioHost + ?Sized>(&mut self, host: &H) -> Result<(), AttachError> {
        if self.graph.is_some() {
            return Ok(());
        }
        let sample_rate = host.admit_graph()?;
        debug!(
            "Analysis graph built: fft {} @ {}Hz, smoothing {}",
            self.fft_size.samples(),
            sample_rate,
            self.smoothing
        );
        self.graph = Some(Graph {
            analyser: Analyser::new(self.fft_size, self.smoothing),
            sample_rate,
            input: None,
            samples: Vec::with_capacity(self.fft_size.samples()),
        });
        Ok(())
    }

    /// Route `source` into the analyser, replacing any previous input.
    ///
    /// Only reads the source's tap: a media element keeps playing to the
    /// speakers through its own path, and capture is not audible anyway.
    pub fn attach<H: AudioHost + ?Sized>(
        &mut self,
        host: &H,
        source: &SignalSource,
    ) -> Result<(), AttachError> {
        self.ensure(host)?;
        if let Some(graph) = self.graph.as_mut() {
            graph.input = Some(source.tap().clone());
        }
        Ok(())
    }

    pub fn detach(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.input = None;
        }
    }

    pub fn is_built(&self) -> bool {
        self.graph.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.graph.as_ref().is_some_and(|g| g.input.is_some())
    }

    /// Snapshot of the current analysis window, `fft_size / 2` bytes long.
    pub fn frame(&mut self) -> Result<&[u8], FrameError> {
        let graph = self.graph.as_mut().ok_or_else(|| {
            FrameError::TransientFrameReadFailure("analysis graph not built".into())
        })?;
        let input = graph.input.as_ref().ok_or_else(|| {
            FrameError::TransientFrameReadFailure("no source attached".into())
        })?;

        input
            .latest_into(graph.analyser.size, &mut graph.samples)
            .map_err(|e| match e {
                TapReadError::Released => FrameError::SourceReleased,
                TapReadError::Poisoned => {
                    FrameError::TransientFrameReadFailure("sample buffer lock poisoned".into())
                }
            })?;

        Ok(graph.analyser.process(&graph.samples))
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size.bin_count()
    }

    /// Centre frequency of bin `index` in Hz, once the graph exists.
    pub fn bin_frequency(&self, index: usize) -> Option<f32> {
        self.graph
            .as_ref()
            .map(|g| index as f32 * g.sample_rate as f32 / self.fft_size.samples() as f32)
    }

    /// Tear the graph down; a later `ensure` builds a fresh one.
    pub fn close(&mut self) {
        if self.graph.take().is_some() {
            debug!("Analysis graph closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHost;

    fn sine_at_bin(bin: usize, size: usize) -> Vec<f32> {
        (0..size)
            .map(|n| {
                let phase = ((bin * n) % size) as f32 / size as f32;
                (2.0 * std::f32::consts::PI * phase).sin()
            })
            .collect()
    }

    #[test]
    fn test_frame_length_is_half_fft() {
        let mut analyser = Analyser::new(FftSize::N1024, 0.0);
        assert_eq!(analyser.process(&[0.0; 1024]).len(), 512);
        assert_eq!(FftSize::N2048.bin_count(), 1024);
    }

    #[test]
    fn test_silence_is_all_zero() {
        let mut analyser = Analyser::new(FftSize::N2048, DEFAULT_SMOOTHING_TIME_CONSTANT);
        assert!(analyser.process(&[0.0; 2048]).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let mut analyser = Analyser::new(FftSize::N1024, 0.0);
        // Quiet enough that the main lobe stays under the -30 dB ceiling.
        let signal: Vec<f32> = sine_at_bin(64, 1024).iter().map(|s| s * 0.05).collect();
        let frame = analyser.process(&signal).to_vec();

        let peak = frame
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 64);
        assert!(frame[64] > frame[63]);
        assert!(frame[64] > frame[65]);
        assert_eq!(frame[300], 0);
    }

    #[test]
    fn test_time_smoothing_ramps_up() {
        let mut analyser = Analyser::new(FftSize::N1024, DEFAULT_SMOOTHING_TIME_CONSTANT);
        let signal = sine_at_bin(32, 1024);
        let quiet: Vec<f32> = signal.iter().map(|s| s * 0.01).collect();

        let first = analyser.process(&quiet)[32];
        let mut last = first;
        for _ in 0..20 {
            last = analyser.process(&quiet)[32];
        }
        assert!(last > first, "{last} should exceed {first}");
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let host = FakeHost::default();
        let mut ctx = AnalysisContext::new(FftSize::N2048, DEFAULT_SMOOTHING_TIME_CONSTANT);
        ctx.ensure(&host).unwrap();
        ctx.ensure(&host).unwrap();
        assert_eq!(host.graphs_admitted(), 1);
        assert!(ctx.is_built());
    }

    #[test]
    fn test_refused_graph_is_reported() {
        let host = FakeHost::refusing_graph();
        let mut ctx = AnalysisContext::new(FftSize::N2048, DEFAULT_SMOOTHING_TIME_CONSTANT);
        assert!(matches!(
            ctx.ensure(&host),
            Err(AttachError::GraphConstructionFailed(_))
        ));
        assert!(!ctx.is_built());
    }

    #[test]
    fn test_frame_without_input_is_transient() {
        let host = FakeHost::default();
        let mut ctx = AnalysisContext::new(FftSize::N1024, 0.0);
        assert!(matches!(
            ctx.frame(),
            Err(FrameError::TransientFrameReadFailure(_))
        ));
        ctx.ensure(&host).unwrap();
        assert!(matches!(
            ctx.frame(),
            Err(FrameError::TransientFrameReadFailure(_))
        ));
    }

    #[test]
    fn test_released_source_is_permanent() {
        let host = FakeHost::default();
        let mut ctx = AnalysisContext::new(FftSize::N1024, 0.0);
        let source = SignalSource::from_capture(&host).unwrap();
        ctx.attach(&host, &source).unwrap();

        source.tap().push_mono(&sine_at_bin(10, 1024));
        assert_eq!(ctx.frame().unwrap().len(), 512);

        source.tap().release();
        assert_eq!(ctx.frame().unwrap_err(), FrameError::SourceReleased);
    }

    #[test]
    fn test_bin_frequency_uses_graph_rate() {
        let host = FakeHost::default();
        let mut ctx = AnalysisContext::new(FftSize::N1024, 0.0);
        assert_eq!(ctx.bin_frequency(1), None);
        ctx.ensure(&host).unwrap();
        approx::assert_relative_eq!(ctx.bin_frequency(64).unwrap(), 64.0 * 48000.0 / 1024.0);
    }
}

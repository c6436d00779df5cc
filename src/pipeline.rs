//! Lifecycle entry points for the surrounding application.

use crate::analysis::AnalysisContext;
use crate::config::ReactiveConfig;
use crate::error::{AttachError, ConfigError};
use crate::host::AudioHost;
use crate::param::{react_param, ParamReader};
use crate::reactive::{FrameScheduler, ReactiveLoop, RunState, TickOutcome};
use crate::source::{ElementId, ElementTaps, MediaElement, SignalSource, SourceKind};
use log::{debug, info};

/// Result of a successful attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachHandle {
    kind: SourceKind,
    element: Option<ElementId>,
    reused: bool,
}

impl AttachHandle {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn element(&self) -> Option<ElementId> {
        self.element
    }

    /// True when an element's memoised tap was reused instead of created.
    pub fn reused(&self) -> bool {
        self.reused
    }
}

/// Snapshot of the stop epoch, taken before a slow attach.
///
/// Any `stop()` in between makes the intent stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartIntent(u64);

/// The audio-reactive pipeline: source, analysis graph, loop, and parameter.
///
/// Everything here runs on the host's UI thread.
pub struct AudioReactive<H, S> {
    host: H,
    context: AnalysisContext,
    taps: ElementTaps,
    source: Option<SignalSource>,
    reactive: ReactiveLoop<S>,
    epoch: u64,
}

impl<H: AudioHost, S: FrameScheduler> AudioReactive<H, S> {
    pub fn new(host: H, scheduler: S, config: ReactiveConfig) -> Result<Self, ConfigError> {
        let smoothing = config.analyser_smoothing()?;
        let (writer, _) = react_param();
        let reactive = ReactiveLoop::new(scheduler, config.band, config.smoother()?, writer);
        Ok(Self {
            host,
            context: AnalysisContext::new(config.fft_size, smoothing),
            taps: ElementTaps::new(),
            source: None,
            reactive,
            epoch: 0,
        })
    }

    /// Tap a media element that is already playing.
    ///
    /// The element should be producing output before this is called; some
    /// platforms misbehave when analysis is wired up first. Tapping the same
    /// element again reuses its node. Any held capture device is released.
    pub fn attach_to_element(&mut self, element: &MediaElement) -> Result<AttachHandle, AttachError> {
        self.context.ensure(&self.host)?;

        let (source, reused) = SignalSource::from_element(&mut self.taps, element)?;
        if let Some(mut previous) = self.source.take() {
            if previous.kind() == SourceKind::LiveCapture {
                previous.release();
            }
        }
        self.context.attach(&self.host, &source)?;
        self.source = Some(source);

        info!(
            "Attached to element {:?}{}",
            element.id(),
            if reused { " (reused tap)" } else { "" }
        );
        Ok(AttachHandle {
            kind: SourceKind::MediaElementTap,
            element: Some(element.id()),
            reused,
        })
    }

    /// Acquire the default input device.
    ///
    /// A previous capture is released before the device is opened again. An
    /// attached element stays connected until the new capture is running, so
    /// a failed acquisition leaves it in place.
    pub fn attach_to_capture(&mut self) -> Result<AttachHandle, AttachError> {
        self.context.ensure(&self.host)?;

        if self.source_kind() == Some(SourceKind::LiveCapture) {
            self.reactive.stop();
            if let Some(mut previous) = self.source.take() {
                previous.release();
            }
            self.context.detach();
        }

        let source = SignalSource::from_capture(&self.host)?;
        if let Some(mut previous) = self.source.take() {
            previous.release();
        }
        self.taps.disconnect_all();
        self.context.attach(&self.host, &source)?;
        self.source = Some(source);

        info!("Attached to live capture");
        Ok(AttachHandle {
            kind: SourceKind::LiveCapture,
            element: None,
            reused: false,
        })
    }

    /// Start the loop. A no-op while running or before a successful attach.
    pub fn start(&mut self) {
        if !self.context.is_attached() {
            debug!("Start ignored: no source attached");
            return;
        }
        self.reactive.start();
    }

    /// Stop the loop and publish 0. Safe in any state, including while an
    /// attach is still in flight.
    pub fn stop(&mut self) {
        self.epoch += 1;
        self.reactive.stop();
    }

    pub fn is_running(&self) -> bool {
        self.reactive.is_running()
    }

    pub fn state(&self) -> RunState {
        self.reactive.state()
    }

    pub fn start_intent(&self) -> StartIntent {
        StartIntent(self.epoch)
    }

    /// Start only if nobody called `stop()` since `intent` was taken.
    pub fn start_if_current(&mut self, intent: StartIntent) -> bool {
        if intent.0 != self.epoch {
            debug!("Start skipped: stopped while attaching");
            return false;
        }
        self.start();
        self.is_running()
    }

    /// Drive one display frame. Call from the host's frame callback.
    pub fn on_frame(&mut self) -> TickOutcome {
        self.reactive.on_frame(&mut self.context)
    }

    pub fn param(&self) -> ParamReader {
        self.reactive.param()
    }

    /// Length of every analysis frame.
    pub fn frequency_bin_count(&self) -> usize {
        self.context.frequency_bin_count()
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source.as_ref().map(SignalSource::kind)
    }

    pub fn scheduler(&self) -> &S {
        self.reactive.scheduler()
    }

    /// Stop, then give the source back: capture is released, element taps
    /// are disconnected but stay memoised.
    pub fn detach(&mut self) {
        self.stop();
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        self.taps.disconnect_all();
        self.context.detach();
    }

    /// Detach and tear down the analysis graph.
    pub fn shutdown(&mut self) {
        self.detach();
        self.context.close();
        info!("Audio-reactive pipeline shut down");
    }
}

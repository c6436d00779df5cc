//! Per-display-frame driver: frame → energy → smoothing → publish.

use crate::analysis::AnalysisContext;
use crate::energy::EnergyBand;
use crate::error::FrameError;
use crate::param::{ParamReader, ParamWriter};
use crate::smoother::Smoother;
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// The host's "call me on the next display frame" mechanism.
///
/// After `request_frame`, the host calls [`ReactiveLoop::on_frame`] once on
/// the next display refresh.
pub trait FrameScheduler {
    fn request_frame(&mut self);

    /// Best effort: a frame that fires anyway is ignored by the loop.
    fn cancel_frame(&mut self);
}

/// What one frame callback did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Published this smoothed value and scheduled the next frame.
    Published(f32),
    /// Transient read failure: nothing published, next frame scheduled.
    Skipped,
    /// Source lost for good: loop is Idle and the parameter is back at 0.
    Halted,
    /// Not our frame, or the loop was stopped before it fired.
    Ignored,
}

pub struct ReactiveLoop<S> {
    state: RunState,
    scheduler: S,
    pending: bool,
    band: EnergyBand,
    smoother: Smoother,
    writer: ParamWriter,
}

impl<S: FrameScheduler> ReactiveLoop<S> {
    pub fn new(scheduler: S, band: EnergyBand, smoother: Smoother, writer: ParamWriter) -> Self {
        Self {
            state: RunState::Idle,
            scheduler,
            pending: false,
            band,
            smoother,
            writer,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn param(&self) -> ParamReader {
        self.writer.reader()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Start scheduling frames. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = RunState::Running;
        self.schedule();
        debug!("Reactive loop started");
        true
    }

    /// Stop scheduling and publish 0. Safe to call in any state.
    pub fn stop(&mut self) {
        if self.state == RunState::Running {
            debug!("Reactive loop stopped");
        }
        self.state = RunState::Idle;
        if self.pending {
            self.pending = false;
            self.scheduler.cancel_frame();
        }
        self.smoother.reset();
        self.writer.reset();
    }

    /// Handle one display frame.
    pub fn on_frame(&mut self, ctx: &mut AnalysisContext) -> TickOutcome {
        if !std::mem::take(&mut self.pending) {
            return TickOutcome::Ignored;
        }
        if !self.is_running() {
            return TickOutcome::Ignored;
        }

        let raw = match ctx.frame() {
            Ok(frame) => self.band.extract(frame),
            Err(FrameError::SourceReleased) => {
                warn!("Signal source released; stopping reactive loop");
                self.stop();
                return TickOutcome::Halted;
            }
            Err(e) => {
                warn!("Skipping frame: {e}");
                self.schedule();
                return TickOutcome::Skipped;
            }
        };

        let value = self.smoother.push(raw);
        self.writer.publish(value);
        self.schedule();
        TickOutcome::Published(value)
    }

    fn schedule(&mut self) {
        if !self.pending {
            self.pending = true;
            self.scheduler.request_frame();
        }
    }
}

//! Fakes shared by the unit tests.

use crate::error::AttachError;
use crate::host::AudioHost;
use crate::reactive::FrameScheduler;
use crate::source::{start_capture, CaptureStream, SampleTap};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

mod noise;

pub use noise::noise;

pub struct FakeHost {
    refuse_graph: bool,
    capture_error: Option<AttachError>,
    start_error: Option<AttachError>,
    graphs: Cell<usize>,
    captures: Cell<usize>,
    stops: Rc<Cell<usize>>,
    last_tap: RefCell<Option<SampleTap>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            refuse_graph: false,
            capture_error: None,
            start_error: None,
            graphs: Cell::new(0),
            captures: Cell::new(0),
            stops: Rc::new(Cell::new(0)),
            last_tap: RefCell::new(None),
        }
    }
}

impl FakeHost {
    pub fn refusing_graph() -> Self {
        Self {
            refuse_graph: true,
            ..Self::default()
        }
    }

    pub fn failing_capture(err: AttachError) -> Self {
        Self {
            capture_error: Some(err),
            ..Self::default()
        }
    }

    /// Opens the device, then fails to start it.
    pub fn failing_start(err: AttachError) -> Self {
        Self {
            start_error: Some(err),
            ..Self::default()
        }
    }

    pub fn graphs_admitted(&self) -> usize {
        self.graphs.get()
    }

    pub fn captures_opened(&self) -> usize {
        self.captures.get()
    }

    pub fn captures_stopped(&self) -> usize {
        self.stops.get()
    }

    /// The tap handed to the most recent `open_capture`.
    pub fn last_tap(&self) -> Option<SampleTap> {
        self.last_tap.borrow().clone()
    }
}

impl AudioHost for FakeHost {
    fn open_capture(&self, tap: SampleTap) -> Result<Box<dyn CaptureStream>, AttachError> {
        *self.last_tap.borrow_mut() = Some(tap);
        if let Some(err) = &self.capture_error {
            return Err(err.clone());
        }
        self.captures.set(self.captures.get() + 1);
        start_capture(Box::new(FakeStream {
            stops: self.stops.clone(),
            start_error: self.start_error.clone(),
        }))
    }

    fn admit_graph(&self) -> Result<u32, AttachError> {
        if self.refuse_graph {
            return Err(AttachError::GraphConstructionFailed(
                "blocked until user gesture".into(),
            ));
        }
        self.graphs.set(self.graphs.get() + 1);
        Ok(48000)
    }
}

struct FakeStream {
    stops: Rc<Cell<usize>>,
    start_error: Option<AttachError>,
}

impl CaptureStream for FakeStream {
    fn start(&mut self) -> Result<(), AttachError> {
        match self.start_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stop(&mut self) {
        self.stops.set(self.stops.get() + 1);
    }
}

#[derive(Default)]
pub struct ManualScheduler {
    requested: usize,
    cancelled: usize,
}

impl ManualScheduler {
    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) {
        self.requested += 1;
    }

    fn cancel_frame(&mut self) {
        self.cancelled += 1;
    }
}

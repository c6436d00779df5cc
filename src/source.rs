//! Signal sources: where analysis samples come from.
//!
//! A source is either a live capture device or a tap on a media element that
//! is already playing. Both end up writing mono samples into a [`SampleTap`]
//! that the analyser reads from on the render thread.

use crate::error::AttachError;
use crate::host::AudioHost;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Maximum number of mono samples to keep in a tap.
/// Large enough to hold several FFT windows worth of data.
pub const MAX_BUFFER_SIZE: usize = 2048 * 4;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MEMO_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Sample tap
// ---------------------------------------------------------------------------

/// Shared ring buffer that an audio callback writes into and the analyser
/// reads from.
#[derive(Clone, Debug)]
pub struct SampleTap {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    released: Arc<AtomicBool>,
}

impl SampleTap {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_BUFFER_SIZE))),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Push interleaved multi-channel samples as mono.
    pub fn push_interleaved(&self, data: &[f32], channels: usize) {
        if self.is_released() {
            return;
        }
        let Ok(mut buf) = self.buffer.lock() else {
            return;
        };
        if channels > 1 {
            for chunk in data.chunks(channels) {
                let mono: f32 = chunk.iter().sum::<f32>() / chunk.len() as f32;
                buf.push_back(mono);
            }
        } else {
            buf.extend(data.iter().copied());
        }
        while buf.len() > MAX_BUFFER_SIZE {
            buf.pop_front();
        }
    }

    /// Push samples that are already mono.
    pub fn push_mono(&self, samples: &[f32]) {
        self.push_interleaved(samples, 1);
    }

    /// Copy the most recent `count` samples into `out`, oldest first.
    ///
    /// Zero-pads at the front when fewer samples have arrived so far.
    pub fn latest_into(&self, count: usize, out: &mut Vec<f32>) -> Result<(), TapReadError> {
        if self.is_released() {
            return Err(TapReadError::Released);
        }
        let buf = self.buffer.lock().map_err(|_| TapReadError::Poisoned)?;
        let have = buf.len().min(count);
        out.clear();
        out.resize(count - have, 0.0);
        out.extend(buf.iter().skip(buf.len() - have).copied());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop buffered samples so a reconnected tap starts fresh.
    pub fn clear(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    /// Mark the tap as permanently gone. Readers see [`TapReadError::Released`].
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
        self.clear();
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Whether both handles point at the same underlying buffer.
    pub fn same_as(&self, other: &SampleTap) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

impl Default for SampleTap {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapReadError {
    Released,
    Poisoned,
}

// ---------------------------------------------------------------------------
// Media elements
// ---------------------------------------------------------------------------

/// Identity of a media element, used as the memo key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(u64);

struct SourceNode {
    owner: u64,
    tap: ElementTap,
}

/// An externally owned playback element.
///
/// The element's own playback path writes audio to the speakers. It calls
/// [`MediaElement::render`] with the mono mix of what it just played, which
/// feeds the analysis tap when one is connected. Tapping therefore never
/// mutes or doubles audible output.
///
/// Like a browser media element, it hands out at most one source node over
/// its whole lifetime.
pub struct MediaElement {
    id: ElementId,
    node: Mutex<Option<SourceNode>>,
    playing: AtomicBool,
    closed: AtomicBool,
}

impl MediaElement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed)),
            node: Mutex::new(None),
            playing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Feed the mono mix of freshly played audio to the tap, if connected.
    pub fn render(&self, mono: &[f32]) {
        let Ok(node) = self.node.lock() else {
            return;
        };
        if let Some(node) = node.as_ref() {
            if node.tap.is_connected() {
                node.tap.samples().push_mono(mono);
            }
        }
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn has_source_node(&self) -> bool {
        self.node.lock().map(|n| n.is_some()).unwrap_or(false)
    }

    /// The element is going away; any tap on it is lost for good.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.playing.store(false, Ordering::Release);
        if let Ok(node) = self.node.lock() {
            if let Some(node) = node.as_ref() {
                node.tap.samples().release();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Create this element's single source node on behalf of memo `owner`.
    fn create_source_node(&self, owner: u64) -> Result<ElementTap, AttachError> {
        if self.is_closed() {
            return Err(AttachError::GraphConstructionFailed(
                "media element is closed".into(),
            ));
        }
        let mut node = self.node.lock().map_err(|_| {
            AttachError::GraphConstructionFailed("media element state poisoned".into())
        })?;
        match node.as_ref() {
            Some(existing) if existing.owner == owner => Ok(existing.tap.clone()),
            Some(_) => Err(AttachError::AlreadyAttachedElsewhere),
            None => {
                let tap = ElementTap {
                    element: self.id,
                    samples: SampleTap::new(),
                    connected: Arc::new(AtomicBool::new(false)),
                };
                *node = Some(SourceNode {
                    owner,
                    tap: tap.clone(),
                });
                Ok(tap)
            }
        }
    }
}

/// The analysis connection point on one media element.
#[derive(Clone, Debug)]
pub struct ElementTap {
    element: ElementId,
    samples: SampleTap,
    connected: Arc<AtomicBool>,
}

impl ElementTap {
    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn samples(&self) -> &SampleTap {
        &self.samples
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn connect(&self) {
        self.samples.clear();
        self.connected.store(true, Ordering::Release);
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

/// Per-element memo of source nodes, keyed by element identity.
///
/// The platform allows one source node per element, so a node is created on
/// the first tap and reused on every later one. Only one element is
/// connected at a time.
pub struct ElementTaps {
    id: u64,
    taps: HashMap<ElementId, ElementTap>,
    active: Option<ElementId>,
}

impl ElementTaps {
    pub fn new() -> Self {
        Self {
            id: NEXT_MEMO_ID.fetch_add(1, Ordering::Relaxed),
            taps: HashMap::new(),
            active: None,
        }
    }

    /// Connect `element`, creating its node only on first use.
    ///
    /// Returns the tap and whether it came from the memo.
    pub fn tap(&mut self, element: &MediaElement) -> Result<(ElementTap, bool), AttachError> {
        self.prune_closed();
        if element.is_closed() {
            return Err(AttachError::GraphConstructionFailed(
                "media element is closed".into(),
            ));
        }

        let (tap, reused) = match self.taps.get(&element.id()) {
            Some(tap) => (tap.clone(), true),
            None => {
                let tap = element.create_source_node(self.id)?;
                self.taps.insert(element.id(), tap.clone());
                debug!("Created source node for element {:?}", element.id());
                (tap, false)
            }
        };

        if let Some(previous) = self.active.filter(|id| *id != element.id()) {
            self.disconnect(previous);
        }
        if !tap.is_connected() {
            tap.connect();
        }
        self.active = Some(element.id());
        Ok((tap, reused))
    }

    pub fn disconnect(&mut self, id: ElementId) {
        if let Some(tap) = self.taps.get(&id) {
            tap.disconnect();
        }
        if self.active == Some(id) {
            self.active = None;
        }
        self.prune_closed();
    }

    /// Forget elements that have closed; their taps are released for good.
    fn prune_closed(&mut self) {
        let before = self.taps.len();
        self.taps.retain(|_, tap| !tap.samples().is_released());
        if self.active.is_some_and(|id| !self.taps.contains_key(&id)) {
            self.active = None;
        }
        if self.taps.len() < before {
            debug!("Pruned {} closed element(s)", before - self.taps.len());
        }
    }

    pub fn disconnect_all(&mut self) {
        for tap in self.taps.values() {
            tap.disconnect();
        }
        self.active = None;
    }

    pub fn active(&self) -> Option<ElementId> {
        self.active
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

impl Default for ElementTaps {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Live capture
// ---------------------------------------------------------------------------

/// An acquired input device stream.
pub trait CaptureStream {
    /// Begin delivering samples.
    fn start(&mut self) -> Result<(), AttachError>;

    /// Stop every channel and give the device back.
    fn stop(&mut self);
}

/// Start a freshly built stream, stopping it again if it won't run.
pub fn start_capture(
    mut stream: Box<dyn CaptureStream>,
) -> Result<Box<dyn CaptureStream>, AttachError> {
    if let Err(e) = stream.start() {
        stream.stop();
        return Err(e);
    }
    Ok(stream)
}

/// A live capture device feeding a tap. Released on drop.
pub struct LiveCapture {
    tap: SampleTap,
    stream: Option<Box<dyn CaptureStream>>,
}

impl LiveCapture {
    pub fn new(tap: SampleTap, stream: Box<dyn CaptureStream>) -> Self {
        Self {
            tap,
            stream: Some(stream),
        }
    }

    pub fn tap(&self) -> &SampleTap {
        &self.tap
    }

    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("Capture stream released");
        }
        self.tap.release();
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none() || self.tap.is_released()
    }
}

impl Drop for LiveCapture {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Signal source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    LiveCapture,
    MediaElementTap,
}

pub enum SignalSource {
    LiveCapture(LiveCapture),
    MediaElementTap(ElementTap),
}

impl SignalSource {
    /// Acquire the default input device.
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`; the caller decides
    /// whether to ask again.
    pub fn from_capture<H: AudioHost + ?Sized>(host: &H) -> Result<Self, AttachError> {
        let tap = SampleTap::new();
        match host.open_capture(tap.clone()) {
            Ok(stream) => Ok(Self::LiveCapture(LiveCapture::new(tap, stream))),
            Err(e) => {
                tap.release();
                Err(e)
            }
        }
    }

    /// Tap an existing element through the memo.
    pub fn from_element(
        taps: &mut ElementTaps,
        element: &MediaElement,
    ) -> Result<(Self, bool), AttachError> {
        if !element.is_playing() {
            warn!(
                "Tapping element {:?} before playback started; some platforms need it playing first",
                element.id()
            );
        }
        let (tap, reused) = taps.tap(element)?;
        Ok((Self::MediaElementTap(tap), reused))
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::LiveCapture(_) => SourceKind::LiveCapture,
            Self::MediaElementTap(_) => SourceKind::MediaElementTap,
        }
    }

    pub fn tap(&self) -> &SampleTap {
        match self {
            Self::LiveCapture(capture) => capture.tap(),
            Self::MediaElementTap(tap) => tap.samples(),
        }
    }

    /// Stop a capture stream, or disconnect an element tap (the node is kept
    /// for reuse).
    pub fn release(&mut self) {
        match self {
            Self::LiveCapture(capture) => capture.release(),
            Self::MediaElementTap(tap) => tap.disconnect(),
        }
    }
}

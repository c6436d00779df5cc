mod player;

use audio_reactive::host::list_input_devices;
use audio_reactive::{
    AudioReactive, CpalHost, FrameScheduler, ListenConfig, ParamReader, ReactiveConfig,
    SourceKind, TickOutcome,
};
use log::{error, info, warn};
use player::Player;
use std::path::PathBuf;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

/// Width of the title-bar meter in characters.
const METER_WIDTH: usize = 24;

// ----------------------------------------------------------------------------

enum ListenMode {
    /// Analyse the default system input device.
    Capture,
    /// Play a WAV file and analyse what is playing.
    Element { path: PathBuf, volume: f32 },
}

/// Display-refresh scheduling through winit redraw requests.
struct RedrawScheduler {
    window: Arc<Window>,
}

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self) {
        self.window.request_redraw();
    }

    fn cancel_frame(&mut self) {
        // winit has no way to withdraw a redraw; the loop ignores it instead.
    }
}

type Pipeline = AudioReactive<CpalHost, RedrawScheduler>;

struct App {
    mode: ListenMode,
    window: Option<Arc<Window>>,
    pipeline: Option<Pipeline>,
    param: Option<ParamReader>,
    // Must keep the player alive or audio stops
    player: Option<Player>,
    listening: bool,
}

impl App {
    fn new(mode: ListenMode) -> Self {
        Self {
            mode,
            window: None,
            pipeline: None,
            param: None,
            player: None,
            listening: false,
        }
    }

    /// One gesture: start sound, then attach and start reactivity.
    ///
    /// Reactivity failures leave the audio playing.
    fn start_listening(&mut self) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };
        let intent = pipeline.start_intent();

        let attached = match &self.mode {
            ListenMode::Capture => pipeline.attach_to_capture(),
            ListenMode::Element { path, volume } => {
                if self.player.is_none() {
                    match Player::open(path, *volume) {
                        Ok(player) => self.player = Some(player),
                        Err(e) => {
                            error!("Cannot play {}: {e}", path.display());
                            return;
                        }
                    }
                }
                let Some(player) = self.player.as_ref() else {
                    return;
                };
                if let Err(e) = player.play() {
                    error!("Playback failed: {e}");
                    return;
                }
                pipeline.attach_to_element(player.element())
            }
        };

        match attached {
            Ok(handle) => {
                if pipeline.start_if_current(intent) {
                    info!("Listening ({:?})", handle.kind());
                }
            }
            Err(e) => {
                warn!("No visual reactivity: {e}");
                if matches!(self.mode, ListenMode::Capture) {
                    return;
                }
            }
        }
        self.listening = true;
        self.update_title();
    }

    fn stop_listening(&mut self) {
        if let Some(player) = self.player.as_ref() {
            player.pause();
        }
        if let Some(pipeline) = self.pipeline.as_mut() {
            if pipeline.source_kind() == Some(SourceKind::LiveCapture) {
                pipeline.detach();
            } else {
                pipeline.stop();
            }
        }
        self.listening = false;
        self.update_title();
    }

    fn toggle(&mut self) {
        if self.listening {
            self.stop_listening();
        } else {
            self.start_listening();
        }
    }

    fn update_title(&self) {
        let (Some(window), Some(param)) = (&self.window, &self.param) else {
            return;
        };
        let value = param.get();
        let filled = (value * METER_WIDTH as f32).round() as usize;
        let meter: String = (0..METER_WIDTH)
            .map(|i| if i < filled { '#' } else { '.' })
            .collect();
        let label = if self.listening { "LISTENING" } else { "LISTEN" };
        window.set_title(&format!("{label} [{meter}] {value:.4}"));
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Only initialise once
        if self.window.is_some() {
            return;
        }

        let attrs = WindowAttributes::default()
            .with_title("LISTEN")
            .with_inner_size(LogicalSize::new(640, 120));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let scheduler = RedrawScheduler {
            window: window.clone(),
        };
        match AudioReactive::new(CpalHost::new(), scheduler, ReactiveConfig::default()) {
            Ok(pipeline) => {
                self.param = Some(pipeline.param());
                self.pipeline = Some(pipeline);
            }
            Err(e) => {
                error!("Invalid pipeline config: {e}");
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
        self.update_title();
        info!("Press Space to toggle listening");
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(pipeline) = self.pipeline.as_mut() {
                    pipeline.shutdown();
                }
                self.player = None;
                event_loop.exit();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && !event.repeat
                    && event.logical_key == Key::Named(NamedKey::Space)
                {
                    self.toggle();
                }
            }

            WindowEvent::RedrawRequested => {
                let outcome = match self.pipeline.as_mut() {
                    Some(pipeline) => pipeline.on_frame(),
                    None => return,
                };
                match outcome {
                    TickOutcome::Published(_) => self.update_title(),
                    TickOutcome::Halted => {
                        warn!("Audio source lost");
                        self.update_title();
                    }
                    TickOutcome::Skipped | TickOutcome::Ignored => {}
                }
            }

            _ => {}
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    // A data file selects element playback; otherwise use the input device
    let mode = if args.len() > 1 {
        let data_path = PathBuf::from(&args[1]);
        let config = match ListenConfig::load(&data_path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                std::process::exit(1);
            }
        };
        let base_dir = data_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        match config.resolve_src(&base_dir) {
            Some(path) => ListenMode::Element {
                path,
                volume: config.volume(),
            },
            None => {
                info!("No audio_src configured; listen control hidden");
                return;
            }
        }
    } else {
        list_input_devices();
        info!("Pass a data file to tap its audio_src instead:");
        info!("  cargo run -- path/to/data.json");
        ListenMode::Capture
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("Failed to create event loop: {e}");
            std::process::exit(1);
        }
    };

    let mut app = App::new(mode);
    if let Err(e) = event_loop.run_app(&mut app) {
        error!("Event loop error: {e}");
    }
}

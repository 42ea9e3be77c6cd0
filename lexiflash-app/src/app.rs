use crate::input::{self, Action};
use crate::settings::Settings;
use ab_glyph::FontVec;
use anyhow::{Context, Result};
use lexiflash_core::Screen;
use lexiflash_experiment::{
    EffectRunner, HttpExperimentClient, OfflineExperiment, ResultsSink, SequencerEvent,
    TrialDataService, TrialSequencer,
};
use lexiflash_render::{SkiaRenderer, choice_at, load_font};
use lexiflash_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::PhysicalKey,
    window::{Fullscreen, Window, WindowId},
};

/// Deadlines closer than this are slept out precisely instead of waiting for the next frame.
const PRECISE_SLEEP_WINDOW: Duration = Duration::from_millis(2);
const STATS_EVERY_FRAMES: u64 = 600;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    sequencer: TrialSequencer<HighPrecisionTimer>,
    renderer: Option<SkiaRenderer>,
    font: Option<FontVec>,
    runner: EffectRunner,
    completions: UnboundedReceiver<SequencerEvent>,
    cursor: Option<PhysicalPosition<f64>>,
    cursor_visible: bool,
    refresh_rate: Option<f64>,
    last_frame: Option<u64>,
    frames: u64,

    should_exit: bool,
    // Declared last: dropped after the runner.
    runtime: Runtime,
}

impl App {
    pub fn new(settings: Settings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("starting the async runtime")?;

        let (trials, sink) = if settings.offline {
            info!(path = %settings.results_path.display(), "running offline");
            let offline = Arc::new(OfflineExperiment::new(settings.results_path.clone()));
            (
                offline.clone() as Arc<dyn TrialDataService>,
                offline as Arc<dyn ResultsSink>,
            )
        } else {
            info!(url = %settings.server_url, "using experiment server");
            let client = Arc::new(
                HttpExperimentClient::new(settings.server_url.clone(), settings.request_timeout())
                    .context("building the HTTP client")?,
            );
            (
                client.clone() as Arc<dyn TrialDataService>,
                client as Arc<dyn ResultsSink>,
            )
        };

        let (runner, completions) = EffectRunner::new(runtime.handle().clone(), trials, sink);
        let sequencer = TrialSequencer::new(settings.experiment.clone(), HighPrecisionTimer::new());

        Ok(Self {
            window: None,
            pixels: None,
            sequencer,
            renderer: None,
            font: resolve_font(settings.font_path.as_ref()),
            runner,
            completions,
            cursor: None,
            cursor_visible: true,
            refresh_rate: None,
            last_frame: None,
            frames: 0,
            should_exit: false,
            runtime,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "lexiflash starting, Space to begin, Esc to quit"
        );

        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .context("no monitor available")?;

        self.refresh_rate = monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let attributes = Window::default_attributes()
            .with_title("Lexiflash")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale = window.scale_factor(),
            refresh_hz = ?self.refresh_rate,
            "window created"
        );

        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface)?);
        let renderer = SkiaRenderer::new(size.width, size.height, self.font.take())?;
        if !renderer.has_font() {
            warn!("rendering without text");
        }
        self.renderer = Some(renderer);

        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn send(&mut self, event: SequencerEvent) {
        let effects = self.sequencer.handle_event(event);
        self.runner.dispatch_all(effects);
    }

    fn drain_completions(&mut self) {
        while let Ok(event) = self.completions.try_recv() {
            self.send(event);
        }
    }

    fn update(&mut self) {
        self.drain_completions();
        if let Some(wait) = self.sequencer.next_deadline() {
            if !wait.is_zero() && wait < PRECISE_SLEEP_WINDOW {
                self.sequencer.timer().sleep(wait);
            }
        }
        let effects = self.sequencer.update();
        self.runner.dispatch_all(effects);
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let display = self.sequencer.display();
        let stats = renderer.render(&display, pixels.frame_mut(), self.sequencer.timer())?;
        if stats.redrawn {
            let screen = &display.screen;
            debug!(
                screen = ?screen,
                draw_ms = stats.draw.as_secs_f64() * 1e3,
                copy_ms = stats.copy.as_secs_f64() * 1e3,
                "redrawn"
            );
        }
        pixels.render()?;

        let now = self.sequencer.timer().now();
        if let Some(last) = self.last_frame.replace(now) {
            let interval = Duration::from_nanos(now.saturating_sub(last));
            self.sequencer.timer_mut().record_frame(interval);
        }
        self.frames += 1;
        if self.frames % STATS_EVERY_FRAMES == 0 {
            let frame = self.sequencer.timer().calibration_stats();
            debug!(
                fps = frame.effective_fps,
                jitter_ms = frame.jitter_ns / 1e6,
                max_ms = frame.max_frame_time_ns / 1e6,
                "frame timing"
            );
        }

        self.sync_cursor(display.screen);
        Ok(())
    }

    // The pointer stays hidden while a word may flash under it.
    fn sync_cursor(&mut self, screen: Screen) {
        let visible = !matches!(
            screen,
            Screen::TrialPending | Screen::FixationCross | Screen::StimulusShown
        );
        if visible != self.cursor_visible {
            if let Some(window) = &self.window {
                window.set_cursor_visible(visible);
            }
            self.cursor_visible = visible;
        }
    }

    fn handle_key(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        match input::map_key(self.sequencer.screen(), code) {
            Some(Action::Event(event)) => self.send(event),
            Some(Action::Exit) => self.cleanup_and_exit(event_loop),
            None => {}
        }
    }

    fn handle_click(&mut self) {
        if !self.sequencer.screen().allows_choice() {
            return;
        }
        let (Some(cursor), Some(renderer)) = (self.cursor, self.renderer.as_ref()) else {
            return;
        };
        let (width, height) = renderer.size();
        if let Some(index) = choice_at(width, height, cursor.x as f32, cursor.y as f32) {
            self.send(SequencerEvent::ChoiceSelected(index));
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(size.width, size.height) {
                warn!(error = %e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(size.width, size.height) {
                warn!(error = %e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(size.width, size.height) {
                warn!(error = %e, "failed to resize canvas");
            }
        }
        info!(width = size.width, height = size.height, "display resized");
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        if let Some(renderer) = &self.renderer {
            if let Some(draw) = renderer.component_stats("draw") {
                info!(
                    avg_ms = draw.average_frame_time_ns / 1e6,
                    max_ms = draw.max_frame_time_ns / 1e6,
                    "draw timing"
                );
            }
        }
        info!(
            trials = self.sequencer.results().len(),
            submission = ?self.sequencer.submission(),
            "experiment closed"
        );

        self.should_exit = true;
        event_loop.exit();
    }
}

fn resolve_font(configured: Option<&PathBuf>) -> Option<FontVec> {
    if let Some(path) = configured {
        match load_font(path) {
            Ok(font) => return Some(font),
            Err(e) => warn!(path = %path.display(), error = %e, "configured font unusable"),
        }
    }
    let found = FONT_CANDIDATES
        .iter()
        .find_map(|candidate| load_font(std::path::Path::new(candidate)).ok());
    if found.is_none() {
        warn!("no font found, text will not be drawn; set font_path in lexiflash.toml");
    }
    found
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!(error = %e, "failed to create window and surface");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                self.update();
                if let Err(e) = self.render() {
                    error!(error = %e, "frame failed");
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                self.handle_key(event.physical_key, event_loop);
            }
            WindowEvent::CursorMoved { position, .. } => self.cursor = Some(position),
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.handle_click(),
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}

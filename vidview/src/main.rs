//! # vidview
//!
//! Multi-stream video viewer. Shows every stream of a URI-addressed source
//! side by side, records to a packet log and plays the recording back.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use vidview_core::render::{GpuRenderer, RenderError};
use vidview_core::{Command, VideoError, VideoRecordRepeat, VideoSource, ViewerConfig, ViewerState};

const DEFAULT_LOG_FILTER: &str = "vidview=info,wgpu=warn";

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        print_usage(&ViewerConfig::default());
        return Ok(());
    }

    let config = ViewerConfig::load();
    let output_uri = args.get(2).cloned().unwrap_or_else(|| config.default_output_uri.clone());

    match args.get(1) {
        Some(input_uri) => match VideoRecordRepeat::open(input_uri, &output_uri) {
            Ok(video) => run(video, config),
            Err(e) => {
                tracing::error!("{}: {}", input_uri, e);
                Ok(())
            }
        },
        None => {
            print_usage(&config);
            let defaults = config.default_input_uris.clone();
            for uri in &defaults {
                match VideoRecordRepeat::open(uri, &output_uri) {
                    Ok(video) => {
                        tracing::info!("Opened {}", uri);
                        return run(video, config);
                    }
                    Err(VideoError::NoStreams) => {
                        tracing::error!("{}: {}", uri, VideoError::NoStreams);
                        return Ok(());
                    }
                    Err(e) => tracing::info!("Tried {}: {}", uri, e),
                }
            }
            tracing::error!("None of the default sources could be opened");
            Ok(())
        }
    }
}

fn print_usage(config: &ViewerConfig) {
    println!("vidview v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage  : vidview [video-uri] [output-uri]");
    println!();
    println!("where video-uri is one of:");
    println!("  test:[size=640x480,n=1,fmt=RGB24]//");
    println!("  file:[start=0]///path/to/frames/*.png");
    println!("  pango:[realtime=1]///path/to/video.pango");
    println!("  mjpeg://http://host/stream");
    println!("  convert:[fmt=GRAY8]//<video-uri>");
    println!("  join://{{<video-uri>}}{{<video-uri>}}");
    println!();
    println!("output-uri defaults to {}", config.default_output_uri);
    println!();
    println!("Keys: 1-9 show/hide stream, shift+1-9 screenshot, r record, p play, s source,");
    println!("      space pause, ,/. seek, a/g auto-window, Esc quit");
    println!();
    println!("Defaulting to:");
    for uri in &config.default_input_uris {
        println!("  {}", uri);
    }
    println!();
}

fn run(video: VideoRecordRepeat, config: ViewerConfig) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::new(video, config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// ============================================================================
// Window Application
// ============================================================================

struct ViewerApp {
    config: ViewerConfig,
    video: VideoRecordRepeat,
    state: ViewerState,
    window: Option<Arc<Window>>,
    renderer: Option<GpuRenderer>,
    cursor: (f32, f32),
    /// Textures need refreshing without a new frame (e.g. a view was shown)
    needs_upload: bool,
    title: String,
    error: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(mut video: VideoRecordRepeat, config: ViewerConfig) -> Self {
        let state = ViewerState::new(&mut video, &config);
        Self {
            config,
            video,
            state,
            window: None,
            renderer: None,
            cursor: (0.0, 0.0),
            needs_upload: false,
            title: String::new(),
            error: None,
        }
    }

    fn initial_size(&self) -> PhysicalSize<u32> {
        let n = self.video.streams().len().max(1) as u32;
        PhysicalSize::new((self.video.width() * n).max(1), self.video.height().max(1))
    }

    fn command(&mut self, command: Command, event_loop: &ActiveEventLoop) {
        self.state.apply(command, &mut self.video);
        self.needs_upload = true;
        if self.state.quit {
            event_loop.exit();
        }
    }

    fn key(&mut self, event: &KeyEvent, event_loop: &ActiveEventLoop) {
        if event.state != ElementState::Pressed {
            return;
        }
        let command = match &event.logical_key {
            Key::Named(NamedKey::Escape) => Some(Command::Quit),
            Key::Named(NamedKey::Space) => Some(Command::TogglePause),
            Key::Character(s) => s.chars().next().and_then(Command::from_char),
            _ => None,
        };
        if let Some(command) = command {
            self.command(command, event_loop);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let grabbed = self.state.step(&mut self.video);
        if grabbed || self.needs_upload {
            for (i, view) in self.state.views.iter().enumerate() {
                if !view.shown {
                    continue;
                }
                if let Some(image) = self.state.image(i) {
                    renderer.upload(i, image, &view.gpu_format);
                }
            }
            self.needs_upload = false;
        }

        let (w, h) = renderer.size();
        self.state.layout(w as f32, h as f32);

        match renderer.render(&self.state.views) {
            Ok(()) => {}
            Err(RenderError::Frame(wgpu::SurfaceError::OutOfMemory)) => {
                self.error = Some(anyhow::anyhow!("GPU out of memory"));
                event_loop.exit();
                return;
            }
            Err(e) => tracing::warn!("Render failed: {}", e),
        }

        let title = format!("{} - {}", self.config.window_title, self.state.status(&self.video));
        if title != self.title {
            if let Some(window) = &self.window {
                window.set_title(&title);
            }
            self.title = title;
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.window_title.clone())
            .with_inner_size(self.initial_size());
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.error = Some(anyhow::anyhow!("Window creation failed: {}", e));
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(GpuRenderer::new(window.clone(), self.state.views.len())) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.error = Some(e.into());
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.command(Command::Quit, event_loop),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.key(&event, event_loop),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
                self.state.mouse_move(self.cursor.0, self.cursor.1);
            }
            WindowEvent::CursorLeft { .. } => {
                self.state.focus = None;
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let (x, y) = self.cursor;
                match (button, state) {
                    (MouseButton::Left, ElementState::Pressed) => self.state.mouse_press(x, y),
                    (MouseButton::Left, ElementState::Released) => self.state.mouse_release(x, y),
                    (MouseButton::Right, ElementState::Pressed) => self.state.reset_view_at(x, y),
                    _ => {}
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 50.0) as f32,
                };
                self.state.scroll(self.cursor.0, self.cursor.1, steps);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

use std::any::Any;
use std::env;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::run_on_demand::EventLoopExtRunOnDemand;
use winit::window::{Window, WindowBuilder};

use tank_battle::{
    key_from_token, App, FileSource, FrameOutcome, HeadlessBackend, KeyBindings, KeyResponse,
    LogStatus, MeshLibrary, Placement, PrintStatus, Renderer, SceneLayout, StateSnapshot,
    StatusSink, WgpuBackend,
};

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;

pub fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let (layout, mut meshes) = load_layout(options.scene.as_deref())?;

    if options.headless {
        return run_headless(&layout, &mut meshes, &options);
    }
    match run_interactive(&layout, &mut meshes) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!("{err}. Falling back to --headless mode.");
            run_headless(&layout, &mut meshes, &options)
        }
        Err(err) => Err(err),
    }
}

/// Reads the layout file if one was given; meshes resolve relative to it.
fn load_layout(path: Option<&str>) -> Result<(SceneLayout, MeshLibrary)> {
    let Some(path) = path else {
        return Ok((SceneLayout::default(), MeshLibrary::new(FileSource::new("."))));
    };
    let xml = fs::read_to_string(path).with_context(|| format!("failed to read scene {path}"))?;
    let layout =
        SceneLayout::from_xml(&xml).with_context(|| format!("failed to parse scene {path}"))?;
    let root = Path::new(path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    println!("Loaded scene with {} objects", layout.objects.len());
    Ok((layout, MeshLibrary::new(FileSource::new(root))))
}

fn run_headless(
    layout: &SceneLayout,
    meshes: &mut MeshLibrary,
    options: &CliOptions,
) -> Result<()> {
    let mut renderer = Renderer::new();
    renderer.initialize(HeadlessBackend::new(WINDOW_WIDTH, WINDOW_HEIGHT))?;
    renderer.resize(WINDOW_WIDTH, WINDOW_HEIGHT);
    let mut app = App::from_layout(renderer, layout, meshes, KeyBindings::default(), PrintStatus)?;

    for key in &options.keys {
        app.handle_key(key)?;
        if !app.is_halted() {
            app.frame()?;
        }
    }
    while app.frames_rendered() < options.frames && !app.is_halted() {
        app.frame()?;
    }

    let snapshot = app.snapshot()?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_final_state(&snapshot);
    }
    Ok(())
}

fn run_interactive(layout: &SceneLayout, meshes: &mut MeshLibrary) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let mut event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Tank Battle")
            .with_inner_size(LogicalSize::new(WINDOW_WIDTH as f64, WINDOW_HEIGHT as f64))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let size = window.inner_size();
    let (width, height) = (size.width.max(1), size.height.max(1));
    let backend = block_on(WgpuBackend::new(Arc::clone(&window), width, height))
        .map_err(|err| WindowInitError::from_error("GPU", err))?;
    let mut renderer = Renderer::new();
    renderer.initialize(backend)?;
    renderer.resize(width, height);
    let mut app = App::from_layout(renderer, layout, meshes, KeyBindings::default(), LogStatus)?;

    let window_id = window.id();
    let mut last_error = None;
    window.request_redraw();
    event_loop.set_control_flow(ControlFlow::Wait);
    event_loop
        .run_on_demand(|event, elwt| {
            let Event::WindowEvent { window_id: id, event } = event else {
                return;
            };
            if id != window_id {
                return;
            }
            let result = match event {
                WindowEvent::CloseRequested => {
                    elwt.exit();
                    Ok(())
                }
                WindowEvent::Resized(size) => {
                    app.resize(size.width, size.height);
                    Ok(())
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    handle_keyboard(&mut app, &window, &event)
                }
                WindowEvent::RedrawRequested if app.is_halted() => {
                    app.redraw().map_err(anyhow::Error::from)
                }
                WindowEvent::RedrawRequested => match app.frame() {
                    Ok(FrameOutcome::Continue) => {
                        window.request_redraw();
                        Ok(())
                    }
                    Ok(FrameOutcome::Halt) => Ok(()),
                    Err(err) => Err(err.into()),
                },
                _ => Ok(()),
            };
            if let Err(err) = result {
                last_error = Some(err);
                elwt.exit();
            }
        })
        .map_err(|err| anyhow!("event loop failed: {err}"))?;

    print_final_state(&app.snapshot()?);
    match last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn handle_keyboard<S: StatusSink>(
    app: &mut App<WgpuBackend, S>,
    window: &Window,
    event: &KeyEvent,
) -> Result<()> {
    if event.state != ElementState::Pressed {
        return Ok(());
    }
    let Some(name) = key_name(&event.logical_key) else {
        return Ok(());
    };
    if app.handle_key(&name)? == KeyResponse::Resume {
        window.request_redraw();
    }
    Ok(())
}

/// Maps a winit logical key onto the browser `KeyboardEvent.key` name.
fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Named(NamedKey::ArrowUp) => Some("ArrowUp".to_string()),
        Key::Named(NamedKey::ArrowDown) => Some("ArrowDown".to_string()),
        Key::Named(NamedKey::ArrowLeft) => Some("ArrowLeft".to_string()),
        Key::Named(NamedKey::ArrowRight) => Some("ArrowRight".to_string()),
        Key::Named(NamedKey::Space) => Some(" ".to_string()),
        Key::Character(text) => Some(text.to_string()),
        _ => None,
    }
}

fn print_final_state(snapshot: &StateSnapshot) {
    println!(
        "Final state after {} frames{}:",
        snapshot.frames,
        if snapshot.paused { " (paused)" } else { "" }
    );
    println!(
        " - {} instances, {} projectiles in flight",
        snapshot.instances, snapshot.projectiles
    );
    for (name, part) in [
        ("Body", snapshot.body),
        ("Turret", snapshot.turret),
        ("Barrel", snapshot.barrel),
    ] {
        print_placement(name, part);
    }
}

fn print_placement(name: &str, part: Placement) {
    println!(
        " - {name} pos=({:.2}, {:.2}, {:.2}) rot=({:.2}, {:.2}, {:.2})",
        part.location.x,
        part.location.y,
        part.location.z,
        part.rotation.x,
        part.rotation.y,
        part.rotation.z
    );
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

const USAGE: &str = "Usage: tank-battle [--scene <file.xml>] [--headless] [--frames <n>] \
                     [--keys <k1,k2,...>] [--json]";

#[derive(Debug, PartialEq)]
struct CliOptions {
    scene: Option<String>,
    headless: bool,
    frames: u64,
    keys: Vec<String>,
    json: bool,
}

impl CliOptions {
    const DEFAULT_FRAMES: u64 = 60;

    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            scene: None,
            headless: false,
            frames: Self::DEFAULT_FRAMES,
            keys: Vec::new(),
            json: false,
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--scene" => options.scene = Some(value_for(&mut args, "--scene")?),
                "--headless" => options.headless = true,
                "--json" => options.json = true,
                "--frames" => {
                    let value = value_for(&mut args, "--frames")?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("--frames expects a number, got {value}"))?;
                }
                "--keys" => {
                    options.keys = value_for(&mut args, "--keys")?
                        .split(',')
                        .filter(|token| !token.is_empty())
                        .map(key_from_token)
                        .collect();
                }
                other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
            }
        }
        Ok(options)
    }
}

fn value_for(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} needs a value. {USAGE}"))
}

#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use gloo_events::EventListener;
use log::{error, info};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlCanvasElement, KeyboardEvent};

use crate::app::{App, FrameOutcome, KeyResponse};
use crate::assets::{MemorySource, MeshLibrary};
use crate::input::KeyBindings;
use crate::render::{Renderer, WgpuBackend};
use crate::scene::SceneLayout;
use crate::status::StatusSink;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Starts the battle on the canvas `canvas_id`, writing key feedback into `message_id`.
///
/// `scene_xml` replaces the built-in layout; `meshes` maps mesh paths used by
/// the layout to OBJ text or to glTF bytes in a `Uint8Array`.
#[wasm_bindgen]
pub async fn run(
    canvas_id: String,
    message_id: String,
    scene_xml: Option<String>,
    meshes: Option<js_sys::Map>,
) -> Result<(), JsValue> {
    start(&canvas_id, &message_id, scene_xml, meshes)
        .await
        .map_err(|err| JsValue::from_str(&format!("{err:#}")))
}

async fn start(
    canvas_id: &str,
    message_id: &str,
    scene_xml: Option<String>,
    meshes: Option<js_sys::Map>,
) -> Result<()> {
    let layout = match scene_xml {
        Some(xml) => SceneLayout::from_xml(&xml)?,
        None => SceneLayout::default(),
    };
    let mut library = MeshLibrary::new(memory_source(meshes));

    let document = web_sys::window()
        .and_then(|win| win.document())
        .ok_or_else(|| anyhow!("document not available"))?;
    let canvas: HtmlCanvasElement = document
        .get_element_by_id(canvas_id)
        .ok_or_else(|| anyhow!("canvas element `{canvas_id}` not found"))?
        .dyn_into()
        .map_err(|_| anyhow!("element `{canvas_id}` is not a canvas"))?;
    let message = document
        .get_element_by_id(message_id)
        .ok_or_else(|| anyhow!("message element `{message_id}` not found"))?;

    let (width, height) = fit_canvas(&canvas);
    let target = wgpu::SurfaceTarget::Canvas(canvas.clone());
    let backend = WgpuBackend::new(target, width, height).await?;
    let mut renderer = Renderer::new();
    renderer.initialize(backend)?;
    renderer.resize(width, height);
    let app = App::from_layout(
        renderer,
        &layout,
        &mut library,
        KeyBindings::default(),
        DomStatus { element: message },
    )?;
    info!("rendering into #{canvas_id} at {width}x{height}");

    let host = Rc::new(WebHost {
        app: RefCell::new(app),
        frame: RefCell::new(None),
        canvas,
    });
    host.install_frame_callback();
    host.listen();
    host.schedule()
}

fn memory_source(meshes: Option<js_sys::Map>) -> MemorySource {
    let mut source = MemorySource::new();
    if let Some(meshes) = meshes {
        meshes.for_each(&mut |contents, path| {
            let Some(path) = path.as_string() else {
                return;
            };
            if let Some(text) = contents.as_string() {
                source.insert(path, text);
            } else if let Some(bytes) = contents.dyn_ref::<js_sys::Uint8Array>() {
                source.insert_bytes(path, bytes.to_vec());
            }
        });
    }
    source
}

/// Sizes the drawing buffer to the element's CSS size times the device pixel ratio.
fn fit_canvas(canvas: &HtmlCanvasElement) -> (u32, u32) {
    let ratio = web_sys::window().map_or(1.0, |win| win.device_pixel_ratio());
    let scale = |css: i32| (f64::from(css) * ratio).round().max(1.0) as u32;
    let (width, height) = (scale(canvas.client_width()), scale(canvas.client_height()));
    canvas.set_width(width);
    canvas.set_height(height);
    (width, height)
}

struct DomStatus {
    element: Element,
}

impl StatusSink for DomStatus {
    fn show(&mut self, text: &str) {
        self.element.set_text_content(Some(text));
    }
}

struct WebHost {
    app: RefCell<App<WgpuBackend, DomStatus>>,
    frame: RefCell<Option<Closure<dyn FnMut()>>>,
    canvas: HtmlCanvasElement,
}

impl WebHost {
    /// The callback owns a handle to the host, so both live for the rest of the page.
    fn install_frame_callback(self: &Rc<Self>) {
        let host = Rc::clone(self);
        let callback = Closure::wrap(Box::new(move || {
            let outcome = host.app.borrow_mut().frame();
            match outcome {
                Ok(FrameOutcome::Continue) => {
                    if let Err(err) = host.schedule() {
                        error!("failed to schedule frame: {err:#}");
                    }
                }
                Ok(FrameOutcome::Halt) => info!("paused"),
                Err(err) => error!("frame failed: {err}"),
            }
        }) as Box<dyn FnMut()>);
        *self.frame.borrow_mut() = Some(callback);
    }

    fn listen(self: &Rc<Self>) {
        let Some(window) = web_sys::window() else {
            return;
        };

        let host = Rc::clone(self);
        EventListener::new(&window, "keydown", move |event| {
            let Some(key) = event.dyn_ref::<KeyboardEvent>().map(KeyboardEvent::key) else {
                return;
            };
            let response = host.app.borrow_mut().handle_key(&key);
            if !matches!(response, Ok(KeyResponse::Ignored)) {
                event.prevent_default();
            }
            match response {
                Ok(KeyResponse::Resume) => {
                    if let Err(err) = host.schedule() {
                        error!("failed to resume: {err:#}");
                    }
                }
                Ok(_) => {}
                Err(err) => error!("key handling failed: {err}"),
            }
        })
        .forget();

        let host = Rc::clone(self);
        EventListener::new(&window, "resize", move |_| {
            let (width, height) = fit_canvas(&host.canvas);
            let mut app = host.app.borrow_mut();
            app.resize(width, height);
            // Resizing clears the canvas; a halted scene gets no frame to repaint it.
            if app.is_halted() {
                if let Err(err) = app.redraw() {
                    error!("redraw failed: {err}");
                }
            }
        })
        .forget();
    }

    fn schedule(&self) -> Result<()> {
        let window = web_sys::window().ok_or_else(|| anyhow!("window not available"))?;
        let frame = self.frame.borrow();
        let callback = frame
            .as_ref()
            .ok_or_else(|| anyhow!("frame callback not installed"))?;
        window
            .request_animation_frame(callback.as_ref().unchecked_ref())
            .map_err(|err| anyhow!("requestAnimationFrame failed: {err:?}"))?;
        Ok(())
    }
}

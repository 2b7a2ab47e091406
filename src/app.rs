//! Frame driver shared by the native and web hosts.

use anyhow::{Context, Result};
use glam::Vec3;
use log::info;
use serde::Serialize;

use crate::assets::MeshLibrary;
use crate::controller::Controller;
use crate::input::KeyBindings;
use crate::instance::InstanceId;
use crate::render::{RenderBackend, RenderError, Renderer};
use crate::scene::SceneLayout;
use crate::status::StatusSink;

/// Whether the host should schedule another frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResponse {
    Handled,
    Ignored,
    /// The key un-paused a halted driver; the host must schedule a frame again.
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub location: Vec3,
    pub rotation: Vec3,
}

/// Serializable summary of the running simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub frames: u64,
    pub paused: bool,
    pub instances: usize,
    pub projectiles: usize,
    pub body: Placement,
    pub turret: Placement,
    pub barrel: Placement,
}

pub struct App<B: RenderBackend, S> {
    renderer: Renderer<B>,
    controller: Controller<S>,
    frames: u64,
    halted: bool,
}

impl<B: RenderBackend, S: StatusSink> App<B, S> {
    pub fn new(renderer: Renderer<B>, controller: Controller<S>) -> Self {
        Self {
            renderer,
            controller,
            frames: 0,
            halted: false,
        }
    }

    /// Builds the battlefield described by `layout` on an initialized renderer.
    pub fn from_layout(
        mut renderer: Renderer<B>,
        layout: &SceneLayout,
        meshes: &mut MeshLibrary,
        bindings: KeyBindings,
        status: S,
    ) -> Result<Self> {
        layout.validate()?;
        let aspect_ratio = renderer.camera().aspect_ratio;
        renderer.set_camera(layout.camera.to_camera(aspect_ratio));

        for prop in layout.props() {
            let instance = prop.instantiate(meshes)?;
            renderer
                .add_model(instance)
                .with_context(|| format!("failed to register `{}`", prop.name))?;
        }
        let rig = layout.rig(meshes)?;
        let controller = Controller::new(&mut renderer, rig, layout.controls, bindings, status)
            .context("failed to register the tank")?;
        info!("scene ready with {} instances", renderer.len());
        Ok(Self::new(renderer, controller))
    }

    /// Advances the simulation one tick and draws it.
    ///
    /// A paused simulation still gets the frame that observes the pause;
    /// after that the host should stop scheduling until [`KeyResponse::Resume`].
    /// Frames requested while halted only redraw the frozen scene.
    pub fn frame(&mut self) -> Result<FrameOutcome, RenderError> {
        if self.halted {
            self.redraw()?;
            return Ok(FrameOutcome::Halt);
        }
        self.controller.update(&mut self.renderer)?;
        self.renderer.render()?;
        self.frames += 1;
        if self.controller.is_paused() {
            self.halted = true;
            Ok(FrameOutcome::Halt)
        } else {
            Ok(FrameOutcome::Continue)
        }
    }

    /// Draws the current state without advancing the simulation.
    pub fn redraw(&mut self) -> Result<(), RenderError> {
        self.renderer.render()?;
        Ok(())
    }

    pub fn handle_key(&mut self, key: &str) -> Result<KeyResponse, RenderError> {
        if self.controller.handle_key(&mut self.renderer, key)?.is_none() {
            return Ok(KeyResponse::Ignored);
        }
        if self.halted && !self.controller.is_paused() {
            self.halted = false;
            return Ok(KeyResponse::Resume);
        }
        Ok(KeyResponse::Handled)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.renderer.resize(width, height);
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<B> {
        &mut self.renderer
    }

    pub fn controller(&self) -> &Controller<S> {
        &self.controller
    }

    pub fn snapshot(&self) -> Result<StateSnapshot, RenderError> {
        let parts = self.controller.parts();
        Ok(StateSnapshot {
            frames: self.frames,
            paused: self.controller.is_paused(),
            instances: self.renderer.len(),
            projectiles: self.controller.projectiles().len(),
            body: self.placement(parts.body)?,
            turret: self.placement(parts.turret)?,
            barrel: self.placement(parts.barrel)?,
        })
    }

    fn placement(&self, id: InstanceId) -> Result<Placement, RenderError> {
        let instance = self
            .renderer
            .instance(id)
            .ok_or(RenderError::UnknownInstance(id))?;
        Ok(Placement {
            location: instance.location,
            rotation: instance.rotation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use crate::status::StatusLine;

    fn app() -> App<HeadlessBackend, StatusLine> {
        let mut renderer = Renderer::new();
        renderer.initialize(HeadlessBackend::new(800, 600)).unwrap();
        renderer.resize(800, 600);
        App::from_layout(
            renderer,
            &SceneLayout::default(),
            &mut MeshLibrary::builtin_only(),
            KeyBindings::default(),
            StatusLine::new(),
        )
        .unwrap()
    }

    #[test]
    fn default_layout_registers_ground_and_tank() {
        let app = app();
        assert_eq!(app.renderer().len(), 4);
        let camera = app.renderer().camera();
        assert_eq!(camera.location, Vec3::new(0.0, 1.2, 2.5));
        assert!((camera.aspect_ratio - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn uninitialized_renderer_is_rejected() {
        let result: Result<App<HeadlessBackend, StatusLine>> = App::from_layout(
            Renderer::new(),
            &SceneLayout::default(),
            &mut MeshLibrary::builtin_only(),
            KeyBindings::default(),
            StatusLine::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn frames_render_every_instance() {
        let mut app = app();
        assert_eq!(app.frame().unwrap(), FrameOutcome::Continue);
        assert_eq!(app.frame().unwrap(), FrameOutcome::Continue);
        assert_eq!(app.frames_rendered(), 2);
        let backend = app.renderer().backend().unwrap();
        assert_eq!(backend.frames_drawn(), 2);
        assert_eq!(backend.last_frame().unwrap().len(), 4);
    }

    #[test]
    fn pause_renders_once_then_halts_until_resumed() {
        let mut app = app();
        assert_eq!(app.handle_key("p").unwrap(), KeyResponse::Handled);
        assert_eq!(app.frame().unwrap(), FrameOutcome::Halt);
        assert!(app.is_halted());
        assert_eq!(app.frames_rendered(), 1);

        // Other keys still steer while halted.
        assert_eq!(app.handle_key("ArrowUp").unwrap(), KeyResponse::Handled);
        assert_eq!(app.handle_key("p").unwrap(), KeyResponse::Resume);
        assert!(!app.is_halted());
        assert_eq!(app.frame().unwrap(), FrameOutcome::Continue);
    }

    #[test]
    fn redraw_while_halted_keeps_shells_frozen() {
        let mut app = app();
        app.handle_key(" ").unwrap();
        app.handle_key("p").unwrap();
        assert_eq!(app.frame().unwrap(), FrameOutcome::Halt);
        let shell = app.controller().projectiles()[0].instance;
        let frozen = app.renderer().instance(shell).unwrap().location;
        let drawn = app.renderer().backend().unwrap().frames_drawn();

        // A window resize makes the host ask for another frame.
        app.resize(1024, 512);
        assert_eq!(app.frame().unwrap(), FrameOutcome::Halt);
        app.redraw().unwrap();

        assert_eq!(app.renderer().instance(shell).unwrap().location, frozen);
        assert_eq!(app.frames_rendered(), 1);
        assert_eq!(app.renderer().backend().unwrap().frames_drawn(), drawn + 2);

        assert_eq!(app.handle_key("p").unwrap(), KeyResponse::Resume);
        assert_eq!(app.frame().unwrap(), FrameOutcome::Continue);
        assert_ne!(app.renderer().instance(shell).unwrap().location, frozen);
    }

    #[test]
    fn pausing_twice_before_a_frame_keeps_running() {
        let mut app = app();
        app.handle_key("p").unwrap();
        assert_eq!(app.handle_key("p").unwrap(), KeyResponse::Handled);
        assert_eq!(app.frame().unwrap(), FrameOutcome::Continue);
    }

    #[test]
    fn unbound_keys_are_ignored() {
        let mut app = app();
        assert_eq!(app.handle_key("q").unwrap(), KeyResponse::Ignored);
        assert_eq!(app.controller().status().current(), None);
    }

    #[test]
    fn fired_shells_show_up_and_land() {
        let mut app = app();
        app.handle_key(" ").unwrap();
        app.frame().unwrap();
        let snapshot = app.snapshot().unwrap();
        assert_eq!(snapshot.projectiles, 1);
        assert_eq!(snapshot.instances, 5);
        assert_eq!(app.renderer().backend().unwrap().last_frame().unwrap().len(), 5);

        for _ in 0..500 {
            app.frame().unwrap();
        }
        let snapshot = app.snapshot().unwrap();
        assert_eq!(snapshot.projectiles, 0);
        assert_eq!(snapshot.instances, 4);
    }

    #[test]
    fn snapshot_serializes_part_placements() {
        let mut app = app();
        app.handle_key("ArrowUp").unwrap();
        app.frame().unwrap();
        let snapshot = app.snapshot().unwrap();
        assert!((snapshot.body.location.x - 0.1).abs() < 1e-6);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["frames"], 1);
        assert_eq!(json["paused"], false);
        assert_eq!(json["body"]["location"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn resize_reaches_backend() {
        let mut app = app();
        app.resize(1024, 512);
        assert_eq!(app.renderer().backend().unwrap().size(), (1024, 512));
        assert_eq!(app.renderer().camera().aspect_ratio, 2.0);
    }
}

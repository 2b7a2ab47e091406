//! Instance registry and per-frame transform pipeline.
//!
//! The [`Renderer`] keeps one record per registered instance holding the
//! instance itself and every backend resource allocated for it, so
//! registration and removal can never leave resources misaligned. The actual
//! draw substrate sits behind [`RenderBackend`]: [`gpu::WgpuBackend`] for a
//! real surface and [`headless::HeadlessBackend`] for tests and tooling.

pub mod gpu;
pub mod headless;

use glam::Mat4;
use log::debug;
use thiserror::Error;

use crate::camera::Camera;
use crate::instance::{InstanceId, RenderableInstance};
use crate::model::StaticModel;

pub use gpu::WgpuBackend;
pub use headless::{HeadlessBackend, HeadlessResources, RecordedDraw};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer has not been initialized")]
    NotInitialized,
    #[error("renderer is already initialized")]
    AlreadyInitialized,
    #[error("instance {0} is not registered")]
    UnknownInstance(InstanceId),
    #[error("GPU support unavailable: {0}")]
    Unsupported(String),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("resource {0} was drawn after being released")]
    StaleResource(u64),
}

/// The draw substrate a [`Renderer`] issues work to.
///
/// A backend owns the device, the single pipeline and the render targets.
/// Resources are created once per registered instance and handed back on
/// removal.
pub trait RenderBackend {
    type Resources;

    /// Allocates the uniform buffer, bind group and vertex buffers for one instance.
    fn create_resources(&mut self, mesh: &StaticModel) -> Result<Self::Resources, RenderError>;

    fn release_resources(&mut self, resources: Self::Resources);

    /// Uploads every transform and draws the whole list in one pass.
    fn draw_frame(&mut self, draws: &[DrawCommand<'_, Self::Resources>]) -> Result<(), RenderError>;

    fn resize(&mut self, width: u32, height: u32);
}

/// One instance's contribution to a frame.
pub struct DrawCommand<'a, R> {
    pub resources: &'a R,
    pub mvp: Mat4,
    pub vertex_count: u32,
}

/// Summary of a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub draws: usize,
    pub vertices: u64,
}

struct Registered<R> {
    id: InstanceId,
    instance: RenderableInstance,
    resources: R,
}

pub struct Renderer<B: RenderBackend> {
    backend: Option<B>,
    camera: Camera,
    // Sorted by id; ids only grow, so this is also registration order.
    records: Vec<Registered<B::Resources>>,
    next_id: u64,
}

impl<B: RenderBackend> Default for Renderer<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> Renderer<B> {
    /// Creates an uninitialized renderer with the default camera.
    pub fn new() -> Self {
        Self {
            backend: None,
            camera: Camera::default(),
            records: Vec::new(),
            next_id: 0,
        }
    }

    /// Installs the backend that owns the device, pipeline and depth buffer.
    pub fn initialize(&mut self, backend: B) -> Result<(), RenderError> {
        if self.backend.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }
        self.backend = Some(backend);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    /// Registers an instance and uploads its mesh once.
    pub fn add_model(&mut self, instance: RenderableInstance) -> Result<InstanceId, RenderError> {
        let backend = self.backend.as_mut().ok_or(RenderError::NotInitialized)?;
        let resources = backend.create_resources(&instance.mesh)?;
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        debug!(
            "registered instance {id} ({} vertices of {})",
            instance.mesh.vertex_count(),
            instance.mesh.name()
        );
        self.records.push(Registered {
            id,
            instance,
            resources,
        });
        Ok(id)
    }

    /// Unregisters an instance and releases every resource paired with it.
    pub fn remove_model(&mut self, id: InstanceId) -> Result<RenderableInstance, RenderError> {
        let index = self.index_of(id)?;
        let record = self.records.remove(index);
        if let Some(backend) = self.backend.as_mut() {
            backend.release_resources(record.resources);
        }
        debug!("removed instance {id}");
        Ok(record.instance)
    }

    pub fn instance(&self, id: InstanceId) -> Option<&RenderableInstance> {
        self.index_of(id).ok().map(|index| &self.records[index].instance)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut RenderableInstance> {
        let index = self.index_of(id).ok()?;
        Some(&mut self.records[index].instance)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.index_of(id).is_ok()
    }

    /// Registered handles in draw order.
    pub fn instance_ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.records.iter().map(|record| record.id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Replaces the active camera; applies from the next frame.
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    /// Resizes the render targets and keeps the camera aspect ratio in step.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.camera.aspect_ratio = width as f32 / height as f32;
        if let Some(backend) = self.backend.as_mut() {
            backend.resize(width, height);
        }
    }

    /// Model-view-projection matrix the next frame would upload for `id`.
    pub fn mvp(&self, id: InstanceId) -> Option<Mat4> {
        self.instance(id)
            .map(|instance| self.camera.view_projection() * instance.model_matrix())
    }

    /// Recomputes every transform and submits one frame.
    pub fn render(&mut self) -> Result<FrameStats, RenderError> {
        let backend = self.backend.as_mut().ok_or(RenderError::NotInitialized)?;
        let view_projection = self.camera.view_projection();

        let draws: Vec<DrawCommand<'_, B::Resources>> = self
            .records
            .iter()
            .map(|record| DrawCommand {
                resources: &record.resources,
                mvp: view_projection * record.instance.model_matrix(),
                vertex_count: record.instance.mesh.vertex_count(),
            })
            .collect();

        let stats = FrameStats {
            draws: draws.len(),
            vertices: draws.iter().map(|draw| u64::from(draw.vertex_count)).sum(),
        };
        backend.draw_frame(&draws)?;
        Ok(stats)
    }

    fn index_of(&self, id: InstanceId) -> Result<usize, RenderError> {
        self.records
            .binary_search_by_key(&id, |record| record.id)
            .map_err(|_| RenderError::UnknownInstance(id))
    }
}

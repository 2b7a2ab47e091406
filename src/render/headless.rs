use std::collections::HashSet;

use glam::Mat4;

use super::{DrawCommand, RenderBackend, RenderError};
use crate::model::StaticModel;

/// Stand-in for the GPU buffers of one instance.
#[derive(Debug)]
pub struct HeadlessResources {
    id: u64,
}

impl HeadlessResources {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A draw call as the GPU would have received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub resource: u64,
    pub mvp: Mat4,
    pub vertex_count: u32,
}

/// Backend that records uploads and draw calls instead of touching a device.
///
/// Drawing with a resource that was already released is reported as
/// [`RenderError::StaleResource`], which is what a use-after-free of a GPU
/// buffer would amount to.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    size: (u32, u32),
    next_resource: u64,
    live: HashSet<u64>,
    released: Vec<u64>,
    released_count: usize,
    uploaded_vertices: u64,
    frames: Vec<Vec<RecordedDraw>>,
    keep_frames: usize,
    frame_count: usize,
}

impl HeadlessBackend {
    const DEFAULT_KEEP_FRAMES: usize = 8;
    const KEEP_RELEASED: usize = 64;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            keep_frames: Self::DEFAULT_KEEP_FRAMES,
            ..Self::default()
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn live_resources(&self) -> usize {
        self.live.len()
    }

    /// The most recently released resource ids, oldest first.
    pub fn released(&self) -> &[u64] {
        &self.released
    }

    pub fn released_count(&self) -> usize {
        self.released_count
    }

    /// Total vertices copied into vertex buffers (positions and normals count once).
    pub fn uploaded_vertices(&self) -> u64 {
        self.uploaded_vertices
    }

    pub fn frames_drawn(&self) -> usize {
        self.frame_count
    }

    pub fn last_frame(&self) -> Option<&[RecordedDraw]> {
        self.frames.last().map(Vec::as_slice)
    }
}

impl RenderBackend for HeadlessBackend {
    type Resources = HeadlessResources;

    fn create_resources(&mut self, mesh: &StaticModel) -> Result<Self::Resources, RenderError> {
        let id = self.next_resource;
        self.next_resource += 1;
        self.live.insert(id);
        self.uploaded_vertices += u64::from(mesh.vertex_count());
        Ok(HeadlessResources { id })
    }

    fn release_resources(&mut self, resources: Self::Resources) {
        if self.live.remove(&resources.id) {
            if self.released.len() == Self::KEEP_RELEASED {
                self.released.remove(0);
            }
            self.released.push(resources.id);
            self.released_count += 1;
        }
    }

    fn draw_frame(
        &mut self,
        draws: &[DrawCommand<'_, Self::Resources>],
    ) -> Result<(), RenderError> {
        let mut frame = Vec::with_capacity(draws.len());
        for draw in draws {
            let resource = draw.resources.id;
            if !self.live.contains(&resource) {
                return Err(RenderError::StaleResource(resource));
            }
            frame.push(RecordedDraw {
                resource,
                mvp: draw.mvp,
                vertex_count: draw.vertex_count,
            });
        }
        if self.frames.len() == self.keep_frames.max(1) {
            self.frames.remove(0);
        }
        self.frames.push(frame);
        self.frame_count += 1;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_history_stays_bounded() {
        let mesh = StaticModel::cuboid("box", glam::Vec3::ONE);
        let mut backend = HeadlessBackend::new(4, 4);
        for _ in 0..1000 {
            let resources = backend.create_resources(&mesh).unwrap();
            backend.release_resources(resources);
        }
        assert_eq!(backend.released_count(), 1000);
        assert_eq!(backend.released().len(), HeadlessBackend::KEEP_RELEASED);
        assert_eq!(backend.released().last(), Some(&999));
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn releasing_twice_counts_once() {
        let mesh = StaticModel::cuboid("box", glam::Vec3::ONE);
        let mut backend = HeadlessBackend::new(4, 4);
        let resources = backend.create_resources(&mesh).unwrap();
        let duplicate = HeadlessResources { id: resources.id() };
        backend.release_resources(resources);
        backend.release_resources(duplicate);
        assert_eq!(backend.released_count(), 1);
    }
}

use glam::Vec3;
use thiserror::Error;

/// Errors raised when mesh data breaks the vertex layout invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("mesh {name}: position has {position} floats but normal has {normal}")]
    NormalCount {
        name: String,
        position: usize,
        normal: usize,
    },
    #[error("mesh {name}: {len} position floats is not a whole number of xyz triples")]
    NotTriples { name: String, len: usize },
    #[error("mesh {name}: expected {expected} uv floats, found {found}")]
    UvCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("texture {width}x{height} needs {expected} RGBA bytes, found {found}")]
    TextureSize {
        width: u32,
        height: u32,
        expected: usize,
        found: usize,
    },
}

/// RGBA8 image attached to a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl TextureImage {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, ModelError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(ModelError::TextureSize {
                width,
                height,
                expected,
                found: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

/// Immutable, de-indexed triangle list shared by every instance that draws it.
///
/// `position` and `normal` are flat xyz triples matched 1:1 by vertex order,
/// `uv` holds one pair per vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticModel {
    name: String,
    position: Vec<f32>,
    normal: Vec<f32>,
    uv: Vec<f32>,
    texture: Option<TextureImage>,
}

impl StaticModel {
    pub fn new(
        name: impl Into<String>,
        position: Vec<f32>,
        normal: Vec<f32>,
        uv: Vec<f32>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if position.len() % 3 != 0 {
            return Err(ModelError::NotTriples {
                name,
                len: position.len(),
            });
        }
        if normal.len() != position.len() {
            return Err(ModelError::NormalCount {
                name,
                position: position.len(),
                normal: normal.len(),
            });
        }
        let expected = position.len() / 3 * 2;
        if uv.len() != expected {
            return Err(ModelError::UvCount {
                name,
                expected,
                found: uv.len(),
            });
        }
        Ok(Self {
            name,
            position,
            normal,
            uv,
            texture: None,
        })
    }

    pub fn with_texture(mut self, texture: TextureImage) -> Self {
        self.texture = Some(texture);
        self
    }

    /// Axis-aligned box centred on the origin.
    pub fn cuboid(name: impl Into<String>, half_extents: Vec3) -> Self {
        // (outward normal, u, v) with u x v == normal so both triangles wind CCW.
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y, Vec3::X),
        ];
        const CORNERS: [(f32, f32); 6] = [
            (-1.0, -1.0),
            (1.0, -1.0),
            (1.0, 1.0),
            (-1.0, -1.0),
            (1.0, 1.0),
            (-1.0, 1.0),
        ];

        let mut position = Vec::with_capacity(FACES.len() * CORNERS.len() * 3);
        let mut normal = Vec::with_capacity(FACES.len() * CORNERS.len() * 3);
        let mut uv = Vec::with_capacity(FACES.len() * CORNERS.len() * 2);
        for (n, u, v) in FACES {
            for (su, sv) in CORNERS {
                let corner = (n + u * su + v * sv) * half_extents;
                position.extend_from_slice(&corner.to_array());
                normal.extend_from_slice(&n.to_array());
                uv.extend_from_slice(&[(su + 1.0) * 0.5, (sv + 1.0) * 0.5]);
            }
        }

        Self {
            name: name.into(),
            position,
            normal,
            uv,
            texture: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> &[f32] {
        &self.position
    }

    pub fn normal(&self) -> &[f32] {
        &self.normal
    }

    pub fn uv(&self) -> &[f32] {
        &self.uv
    }

    pub fn texture(&self) -> Option<&TextureImage> {
        self.texture.as_ref()
    }

    pub fn vertex_count(&self) -> u32 {
        (self.position.len() / 3) as u32
    }

    /// Mean of all vertex positions, or the origin for an empty mesh.
    pub fn centroid(&self) -> Vec3 {
        let count = self.vertex_count();
        if count == 0 {
            return Vec3::ZERO;
        }
        let sum = self
            .position
            .chunks_exact(3)
            .fold(Vec3::ZERO, |acc, p| acc + Vec3::from_slice(p));
        sum / count as f32
    }
}

//! Mesh references and the cache that shares loaded meshes between instances.
//!
//! A reference is either a built-in primitive (`builtin:cube`,
//! `builtin:shell`), a mesh file path (`models/tank.obj`, first sub-mesh) or
//! a path with a sub-mesh selector (`models/tank.obj#Turret`). Paths ending
//! in `.gltf` or `.glb` are read as glTF, everything else as OBJ.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use log::debug;

use crate::gltf_mesh::{is_gltf_path, load_gltf_from_slice};
use crate::model::StaticModel;
use crate::obj::load_obj_from_str;

pub const BUILTIN_CUBE: &str = "builtin:cube";
pub const BUILTIN_SHELL: &str = "builtin:shell";

/// Where mesh files come from.
pub trait MeshSource {
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>>;

    fn read_text(&self, path: &str) -> Result<String> {
        String::from_utf8(self.read_bytes(path)?)
            .map_err(|_| anyhow!("`{path}` is not valid UTF-8"))
    }
}

/// Reads files relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MeshSource for FileSource {
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        fs::read(&full).with_context(|| format!("failed to read {}", full.display()))
    }
}

/// In-memory files, used by the web host and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into().into_bytes());
    }

    pub fn insert_bytes(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }
}

impl MeshSource for MemorySource {
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no mesh file named `{path}`"))
    }
}

pub struct MeshLibrary {
    source: Box<dyn MeshSource>,
    cache: HashMap<String, Arc<StaticModel>>,
}

impl MeshLibrary {
    pub fn new(source: impl MeshSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache: HashMap::new(),
        }
    }

    /// Library that can only resolve built-in primitives and inserted meshes.
    pub fn builtin_only() -> Self {
        Self::new(MemorySource::new())
    }

    /// Registers a mesh under `reference`, replacing any cached entry.
    pub fn insert(&mut self, reference: impl Into<String>, mesh: Arc<StaticModel>) {
        self.cache.insert(reference.into(), mesh);
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolves `reference`, loading and caching it on first use.
    pub fn get(&mut self, reference: &str) -> Result<Arc<StaticModel>> {
        if let Some(mesh) = self.cache.get(reference) {
            return Ok(Arc::clone(mesh));
        }

        let mesh = match reference.strip_prefix("builtin:") {
            Some(primitive) => Arc::new(builtin(primitive)?),
            None => self.load(reference)?,
        };
        self.cache.insert(reference.to_string(), Arc::clone(&mesh));
        Ok(mesh)
    }

    fn load(&mut self, reference: &str) -> Result<Arc<StaticModel>> {
        let (path, selector) = match reference.split_once('#') {
            Some((path, sub)) => (path, Some(sub)),
            None => (reference, None),
        };
        let meshes = if is_gltf_path(path) {
            let bytes = self.source.read_bytes(path)?;
            load_gltf_from_slice(path, &bytes)
        } else {
            let text = self.source.read_text(path)?;
            load_obj_from_str(path, &text)
        }
        .with_context(|| format!("failed to parse mesh `{path}`"))?;
        debug!("loaded {} sub-meshes from {path}", meshes.len());

        let meshes: Vec<Arc<StaticModel>> = meshes.into_iter().map(Arc::new).collect();
        let found = match selector {
            Some(sub) => meshes
                .iter()
                .find(|mesh| mesh.name() == sub)
                .cloned()
                .ok_or_else(|| anyhow!("`{path}` has no sub-mesh named `{sub}`"))?,
            None => Arc::clone(&meshes[0]),
        };

        self.cache
            .entry(path.to_string())
            .or_insert_with(|| Arc::clone(&meshes[0]));
        for mesh in &meshes {
            self.cache
                .entry(format!("{path}#{}", mesh.name()))
                .or_insert_with(|| Arc::clone(mesh));
        }
        Ok(found)
    }
}

fn builtin(primitive: &str) -> Result<StaticModel> {
    match primitive {
        "cube" => Ok(StaticModel::cuboid("cube", Vec3::splat(0.5))),
        "shell" => Ok(StaticModel::cuboid("shell", Vec3::new(0.04, 0.015, 0.015))),
        other => bail!("unknown built-in mesh `{other}`"),
    }
}

//! Core of a small 3D tank battle.
//!
//! A [`Renderer`] owns the list of placed meshes and draws them through a
//! [`render::RenderBackend`]; the [`Controller`] turns key presses into tank
//! motion and shells; [`App`] drives both one frame at a time. The binary and
//! the web entry point are thin hosts around [`App`].

pub mod app;
pub mod assets;
pub mod camera;
pub mod controller;
pub mod gltf_mesh;
pub mod input;
pub mod instance;
pub mod model;
pub mod obj;
pub mod render;
pub mod scene;
pub mod status;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{App, FrameOutcome, KeyResponse, Placement, StateSnapshot};
pub use assets::{FileSource, MemorySource, MeshLibrary, MeshSource};
pub use camera::Camera;
pub use controller::{Controller, ControllerConfig, Projectile, TankParts, TankRig};
pub use input::{key_from_token, Action, KeyBindings};
pub use instance::{InstanceId, RenderableInstance};
pub use model::{ModelError, StaticModel, TextureImage};
pub use gltf_mesh::load_gltf_from_slice;
pub use obj::load_obj_from_str;
pub use render::{FrameStats, HeadlessBackend, RenderBackend, RenderError, Renderer, WgpuBackend};
pub use scene::{CameraLayout, ObjectLayout, Role, SceneLayout};
pub use status::{LogStatus, PrintStatus, StatusLine, StatusSink};

use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::assets::{MeshLibrary, BUILTIN_CUBE, BUILTIN_SHELL};
use crate::camera::Camera;
use crate::controller::{ControllerConfig, TankRig};
use crate::instance::RenderableInstance;

/// What an object in the layout becomes at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Body,
    Turret,
    Barrel,
    /// Template cloned for every shell; never registered itself.
    Projectile,
    Prop,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "body" => Ok(Role::Body),
            "turret" => Ok(Role::Turret),
            "barrel" => Ok(Role::Barrel),
            "projectile" => Ok(Role::Projectile),
            "prop" => Ok(Role::Prop),
            other => bail!("unknown role `{other}`"),
        }
    }
}

/// Camera placement; `fov` is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraLayout {
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f32,
}

impl Default for CameraLayout {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.2, 2.5),
            target: Vec3::ZERO,
            fov: 60.0,
        }
    }
}

impl CameraLayout {
    pub fn to_camera(&self, aspect_ratio: f32) -> Camera {
        Camera::new(
            self.position,
            self.target,
            self.fov.to_radians(),
            aspect_ratio,
        )
    }
}

/// One placed mesh; `rotation` is in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectLayout {
    pub name: String,
    pub role: Role,
    pub mesh: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl ObjectLayout {
    fn new(name: &str, role: Role, mesh: &str, position: Vec3, scale: Vec3) -> Self {
        Self {
            name: name.to_string(),
            role,
            mesh: mesh.to_string(),
            position,
            rotation: Vec3::ZERO,
            scale,
        }
    }

    pub fn instantiate(&self, meshes: &mut MeshLibrary) -> Result<RenderableInstance> {
        let mesh = meshes
            .get(&self.mesh)
            .with_context(|| format!("object `{}` has an unusable mesh", self.name))?;
        Ok(RenderableInstance::new(mesh)
            .with_location(self.position)
            .with_rotation(Vec3::new(
                self.rotation.x.to_radians(),
                self.rotation.y.to_radians(),
                self.rotation.z.to_radians(),
            ))
            .with_scale(self.scale))
    }
}

/// Startup description of the battlefield: camera, tank rig, props and tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneLayout {
    pub camera: CameraLayout,
    pub controls: ControllerConfig,
    pub objects: Vec<ObjectLayout>,
}

impl Default for SceneLayout {
    /// A ground slab and a tank built from boxes.
    fn default() -> Self {
        Self {
            camera: CameraLayout::default(),
            controls: ControllerConfig::default(),
            objects: vec![
                ObjectLayout::new(
                    "Ground",
                    Role::Prop,
                    BUILTIN_CUBE,
                    Vec3::new(0.0, -0.05, 0.0),
                    Vec3::new(4.0, 0.1, 4.0),
                ),
                ObjectLayout::new(
                    "Body",
                    Role::Body,
                    BUILTIN_CUBE,
                    Vec3::new(0.0, 0.075, 0.0),
                    Vec3::new(0.5, 0.15, 0.3),
                ),
                ObjectLayout::new(
                    "Turret",
                    Role::Turret,
                    BUILTIN_CUBE,
                    Vec3::new(0.0, 0.2, 0.0),
                    Vec3::new(0.22, 0.1, 0.2),
                ),
                ObjectLayout::new(
                    "Barrel",
                    Role::Barrel,
                    BUILTIN_CUBE,
                    Vec3::new(0.0, 0.2, 0.0),
                    Vec3::new(0.35, 0.04, 0.04),
                ),
                ObjectLayout::new(
                    "Shell",
                    Role::Projectile,
                    BUILTIN_SHELL,
                    Vec3::ZERO,
                    Vec3::splat(0.8),
                ),
            ],
        }
    }
}

impl SceneLayout {
    /// Parses a layout document. Camera and controls fall back to the defaults.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();

        let mut camera = CameraLayout::default();
        if let Some(node) = child(&root, "camera") {
            camera.position = parse_vec3(optional_text(&node, "position"), camera.position)?;
            camera.target = parse_vec3(optional_text(&node, "target"), camera.target)?;
            camera.fov = parse_f32(optional_text(&node, "fov"), camera.fov)?;
        }

        let mut controls = ControllerConfig::default();
        if let Some(node) = child(&root, "controls") {
            parse_controls(&node, &mut controls)?;
        }

        let mut objects = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("object")) {
            let name = required_text(&node, "name")?;
            let role = optional_text(&node, "role")
                .as_deref()
                .unwrap_or("prop")
                .parse::<Role>()
                .with_context(|| format!("object `{name}`"))?;
            let mesh = optional_text(&node, "mesh").unwrap_or_else(|| BUILTIN_CUBE.to_string());
            let position = parse_vec3(optional_text(&node, "position"), Vec3::ZERO)
                .with_context(|| format!("object `{name}`"))?;
            let rotation = parse_vec3(optional_text(&node, "rotation"), Vec3::ZERO)
                .with_context(|| format!("object `{name}`"))?;
            let scale = parse_vec3(optional_text(&node, "scale"), Vec3::ONE)
                .with_context(|| format!("object `{name}`"))?;
            objects.push(ObjectLayout {
                name,
                role,
                mesh,
                position,
                rotation,
                scale,
            });
        }

        let layout = Self {
            camera,
            controls,
            objects,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Checks that the tank roles are each filled exactly once.
    pub fn validate(&self) -> Result<()> {
        for role in [Role::Body, Role::Turret, Role::Barrel, Role::Projectile] {
            let count = self.objects.iter().filter(|o| o.role == role).count();
            if count != 1 {
                bail!("scene needs exactly one {role:?} object, found {count}");
            }
        }
        Ok(())
    }

    pub fn props(&self) -> impl Iterator<Item = &ObjectLayout> {
        self.objects.iter().filter(|o| o.role == Role::Prop)
    }

    pub fn rig(&self, meshes: &mut MeshLibrary) -> Result<TankRig> {
        Ok(TankRig {
            body: self.single(Role::Body)?.instantiate(meshes)?,
            turret: self.single(Role::Turret)?.instantiate(meshes)?,
            barrel: self.single(Role::Barrel)?.instantiate(meshes)?,
            projectile: self.single(Role::Projectile)?.instantiate(meshes)?,
        })
    }

    fn single(&self, role: Role) -> Result<&ObjectLayout> {
        self.objects
            .iter()
            .find(|o| o.role == role)
            .ok_or_else(|| anyhow!("scene has no {role:?} object"))
    }
}

fn parse_controls(node: &Node<'_, '_>, config: &mut ControllerConfig) -> Result<()> {
    let fields: [(&str, &mut f32); 12] = [
        ("move_step", &mut config.move_step),
        ("turn_step", &mut config.turn_step),
        ("turret_turn_step", &mut config.turret_turn_step),
        ("pitch_step", &mut config.pitch_step),
        ("pitch_limit", &mut config.pitch_limit),
        ("turret_radius", &mut config.turret_radius),
        ("muzzle_length", &mut config.muzzle_length),
        ("muzzle_height", &mut config.muzzle_height),
        ("launch_pitch", &mut config.launch_pitch),
        ("muzzle_speed", &mut config.muzzle_speed),
        ("gravity", &mut config.gravity),
        ("ground_level", &mut config.ground_level),
    ];
    for (tag, value) in fields {
        *value = parse_f32(optional_text(node, tag), *value)
            .with_context(|| format!("invalid <{tag}> in <controls>"))?;
    }
    Ok(())
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let components = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("`{value}` is not a vector"))?;
    match components[..] {
        [x, y, z] => Ok(Vec3::new(x, y, z)),
        _ => bail!("vector `{value}` needs exactly 3 components"),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float `{value}`: {err}")),
        None => Ok(default),
    }
}

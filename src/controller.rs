//! Keyboard-driven tank kinematics and projectile lifecycle.
//!
//! The controller never owns GPU resources. It registers the tank parts and
//! projectiles through [`Renderer::add_model`]/[`Renderer::remove_model`] and
//! otherwise only rewrites instance transforms through the handles it keeps.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::input::{Action, KeyBindings};
use crate::instance::{facing, InstanceId, RenderableInstance};
use crate::model::StaticModel;
use crate::render::{RenderBackend, RenderError, Renderer};
use crate::status::StatusSink;

/// Step sizes and ballistic constants; distances are world units, angles radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub move_step: f32,
    pub turn_step: f32,
    pub turret_turn_step: f32,
    pub pitch_step: f32,
    pub pitch_limit: f32,
    pub turret_radius: f32,
    pub muzzle_length: f32,
    pub muzzle_height: f32,
    pub launch_pitch: f32,
    /// Initial projectile speed per tick.
    pub muzzle_speed: f32,
    /// Downward velocity gained per tick.
    pub gravity: f32,
    pub ground_level: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            move_step: 0.1,
            turn_step: 0.1,
            turret_turn_step: 0.05,
            pitch_step: 0.05,
            pitch_limit: 0.25,
            turret_radius: 0.25,
            muzzle_length: 0.25,
            muzzle_height: 0.15,
            launch_pitch: 0.15,
            muzzle_speed: 0.08,
            gravity: 0.001,
            ground_level: 0.0,
        }
    }
}

/// Initial placement of the tank parts plus the template every shell is cloned from.
#[derive(Debug, Clone)]
pub struct TankRig {
    pub body: RenderableInstance,
    pub turret: RenderableInstance,
    pub barrel: RenderableInstance,
    /// Only the mesh and scale are used.
    pub projectile: RenderableInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TankParts {
    pub body: InstanceId,
    pub turret: InstanceId,
    pub barrel: InstanceId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projectile {
    pub instance: InstanceId,
    pub velocity: Vec3,
}

pub struct Controller<S> {
    config: ControllerConfig,
    bindings: KeyBindings,
    status: S,
    parts: TankParts,
    shell_mesh: Arc<StaticModel>,
    shell_scale: Vec3,
    projectiles: Vec<Projectile>,
    paused: bool,
}

impl<S: StatusSink> Controller<S> {
    /// Registers the tank parts with `renderer` and snaps turret and barrel onto the body.
    pub fn new<B: RenderBackend>(
        renderer: &mut Renderer<B>,
        rig: TankRig,
        config: ControllerConfig,
        bindings: KeyBindings,
        status: S,
    ) -> Result<Self, RenderError> {
        let parts = TankParts {
            body: renderer.add_model(rig.body)?,
            turret: renderer.add_model(rig.turret)?,
            barrel: renderer.add_model(rig.barrel)?,
        };
        let controller = Self {
            config,
            bindings,
            status,
            parts,
            shell_mesh: rig.projectile.mesh,
            shell_scale: rig.projectile.scale,
            projectiles: Vec::new(),
            paused: false,
        };
        controller.recompute_barrel_location(renderer)?;
        Ok(controller)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    pub fn status(&self) -> &S {
        &self.status
    }

    pub fn parts(&self) -> TankParts {
        self.parts
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Looks `key` up in the bindings and applies the bound action.
    ///
    /// Returns `Ok(None)` for unbound keys, which leave all state untouched.
    pub fn handle_key<B: RenderBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        key: &str,
    ) -> Result<Option<Action>, RenderError> {
        let Some(action) = self.bindings.action_for(key) else {
            return Ok(None);
        };
        self.apply(renderer, action)?;
        Ok(Some(action))
    }

    pub fn apply<B: RenderBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        action: Action,
    ) -> Result<(), RenderError> {
        match action {
            Action::Forward => self.move_body(renderer, 1.0)?,
            Action::Backward => self.move_body(renderer, -1.0)?,
            Action::TurnLeft => self.turn_body(renderer, 1.0)?,
            Action::TurnRight => self.turn_body(renderer, -1.0)?,
            Action::TurretLeft => self.turn_turret(renderer, 1.0)?,
            Action::TurretRight => self.turn_turret(renderer, -1.0)?,
            Action::TurretUp => self.pitch_turret(renderer, 1.0)?,
            Action::TurretDown => self.pitch_turret(renderer, -1.0)?,
            Action::Fire => self.fire(renderer)?,
            Action::TogglePause => {
                self.paused = !self.paused;
                info!(
                    "simulation {}",
                    if self.paused { "paused" } else { "resumed" }
                );
            }
        }
        self.status
            .show(&format!("The Key \"{}\" is down.", action.label()));
        Ok(())
    }

    /// Advances every projectile by one tick and retires those below ground.
    ///
    /// Returns how many projectiles were retired.
    pub fn update<B: RenderBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
    ) -> Result<usize, RenderError> {
        let mut retired = 0;
        let mut index = 0;
        while index < self.projectiles.len() {
            let projectile = &mut self.projectiles[index];
            let shell = part_mut(renderer, projectile.instance)?;
            shell.location += projectile.velocity;
            projectile.velocity.y -= self.config.gravity;
            let horizontal = Vec2::new(projectile.velocity.x, projectile.velocity.z).length();
            shell.rotation.z = projectile.velocity.y.atan2(horizontal);

            if shell.location.y < self.config.ground_level {
                let projectile = self.projectiles.remove(index);
                renderer.remove_model(projectile.instance)?;
                debug!("projectile {} hit the ground", projectile.instance);
                retired += 1;
                continue;
            }
            index += 1;
        }
        Ok(retired)
    }

    /// Turret yaw measured from the body's yaw.
    pub fn relative_turret_yaw<B: RenderBackend>(
        &self,
        renderer: &Renderer<B>,
    ) -> Result<f32, RenderError> {
        let body = part(renderer, self.parts.body)?;
        let barrel = part(renderer, self.parts.barrel)?;
        Ok(barrel.rotation.y - body.rotation.y)
    }

    fn move_body<B: RenderBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        direction: f32,
    ) -> Result<(), RenderError> {
        let body = part_mut(renderer, self.parts.body)?;
        let step = body.facing() * self.config.move_step * direction;
        body.location += step;
        self.recompute_barrel_location(renderer)
    }

    fn turn_body<B: RenderBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        direction: f32,
    ) -> Result<(), RenderError> {
        let offset = self.relative_turret_yaw(renderer)?;
        let body = part_mut(renderer, self.parts.body)?;
        body.rotation.y += self.config.turn_step * direction;
        let body_yaw = body.rotation.y;
        self.set_turret_yaw(renderer, body_yaw + offset)?;
        self.recompute_barrel_location(renderer)
    }

    fn turn_turret<B: RenderBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        direction: f32,
    ) -> Result<(), RenderError> {
        let offset =
            self.relative_turret_yaw(renderer)? + self.config.turret_turn_step * direction;
        let body_yaw = part(renderer, self.parts.body)?.rotation.y;
        self.set_turret_yaw(renderer, body_yaw + offset)?;
        self.recompute_barrel_location(renderer)
    }

    fn pitch_turret<B: RenderBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        direction: f32,
    ) -> Result<(), RenderError> {
        let limit = self.config.pitch_limit;
        let turret = part_mut(renderer, self.parts.turret)?;
        let pitch = (turret.rotation.z + self.config.pitch_step * direction).clamp(-limit, limit);
        turret.rotation.z = pitch;
        part_mut(renderer, self.parts.barrel)?.rotation.z = pitch;
        Ok(())
    }

    fn fire<B: RenderBackend>(&mut self, renderer: &mut Renderer<B>) -> Result<(), RenderError> {
        let pitch = part(renderer, self.parts.turret)?.rotation.z;
        let barrel = part(renderer, self.parts.barrel)?;
        let rotation = Vec3::new(0.0, barrel.rotation.y, pitch + self.config.launch_pitch);
        let direction = facing(rotation);
        let location = barrel.location
            + Vec3::Y * self.config.muzzle_height
            + direction * self.config.muzzle_length;

        let shell = RenderableInstance::new(Arc::clone(&self.shell_mesh))
            .with_location(location)
            .with_rotation(rotation)
            .with_scale(self.shell_scale);
        let instance = renderer.add_model(shell)?;
        self.projectiles.push(Projectile {
            instance,
            velocity: direction * self.config.muzzle_speed,
        });
        debug!("fired projectile {instance} from {location}");
        Ok(())
    }

    fn set_turret_yaw<B: RenderBackend>(
        &self,
        renderer: &mut Renderer<B>,
        yaw: f32,
    ) -> Result<(), RenderError> {
        part_mut(renderer, self.parts.turret)?.rotation.y = yaw;
        part_mut(renderer, self.parts.barrel)?.rotation.y = yaw;
        Ok(())
    }

    /// Places turret and barrel on a circle of `turret_radius` around the body,
    /// shifted by the difference between their facing and the body's.
    fn recompute_barrel_location<B: RenderBackend>(
        &self,
        renderer: &mut Renderer<B>,
    ) -> Result<(), RenderError> {
        let body = part(renderer, self.parts.body)?;
        let (origin, body_yaw) = (body.location, body.rotation.y);
        for id in [self.parts.turret, self.parts.barrel] {
            let piece = part_mut(renderer, id)?;
            let offset = (planar_facing(piece.rotation.y) - planar_facing(body_yaw))
                * self.config.turret_radius;
            piece.location.x = origin.x + offset.x;
            piece.location.z = origin.z + offset.z;
        }
        Ok(())
    }
}

fn planar_facing(yaw: f32) -> Vec3 {
    Vec3::new(yaw.cos(), 0.0, -yaw.sin())
}

fn part<B: RenderBackend>(
    renderer: &Renderer<B>,
    id: InstanceId,
) -> Result<&RenderableInstance, RenderError> {
    renderer.instance(id).ok_or(RenderError::UnknownInstance(id))
}

fn part_mut<B: RenderBackend>(
    renderer: &mut Renderer<B>,
    id: InstanceId,
) -> Result<&mut RenderableInstance, RenderError> {
    renderer
        .instance_mut(id)
        .ok_or(RenderError::UnknownInstance(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use crate::status::StatusLine;

    const EPS: f32 = 1e-5;

    fn rig() -> TankRig {
        let cube = Arc::new(StaticModel::cuboid("cube", Vec3::splat(0.5)));
        let shell = Arc::new(StaticModel::cuboid("shell", Vec3::new(0.04, 0.015, 0.015)));
        TankRig {
            body: RenderableInstance::new(Arc::clone(&cube))
                .with_location(Vec3::new(0.0, 0.075, 0.0))
                .with_scale(Vec3::new(0.5, 0.15, 0.3)),
            turret: RenderableInstance::new(Arc::clone(&cube))
                .with_location(Vec3::new(0.0, 0.2, 0.0))
                .with_scale(Vec3::new(0.22, 0.1, 0.2)),
            barrel: RenderableInstance::new(cube)
                .with_location(Vec3::new(0.0, 0.2, 0.0))
                .with_scale(Vec3::new(0.35, 0.04, 0.04)),
            projectile: RenderableInstance::new(shell).with_scale(Vec3::splat(0.8)),
        }
    }

    fn setup() -> (Renderer<HeadlessBackend>, Controller<StatusLine>) {
        let mut renderer = Renderer::new();
        renderer.initialize(HeadlessBackend::new(640, 480)).unwrap();
        let controller = Controller::new(
            &mut renderer,
            rig(),
            ControllerConfig::default(),
            KeyBindings::default(),
            StatusLine::new(),
        )
        .unwrap();
        (renderer, controller)
    }

    fn location(renderer: &Renderer<HeadlessBackend>, id: InstanceId) -> Vec3 {
        renderer.instance(id).unwrap().location
    }

    fn rotation(renderer: &Renderer<HeadlessBackend>, id: InstanceId) -> Vec3 {
        renderer.instance(id).unwrap().rotation
    }

    fn press(
        renderer: &mut Renderer<HeadlessBackend>,
        controller: &mut Controller<StatusLine>,
        keys: &[&str],
    ) {
        for key in keys {
            controller.handle_key(renderer, key).unwrap();
        }
    }

    fn assert_turret_on_body(
        renderer: &Renderer<HeadlessBackend>,
        controller: &Controller<StatusLine>,
    ) {
        let parts = controller.parts();
        let body = renderer.instance(parts.body).unwrap();
        for id in [parts.turret, parts.barrel] {
            let part = renderer.instance(id).unwrap();
            let expected = body.location
                + (planar_facing(part.rotation.y) - planar_facing(body.rotation.y)) * 0.25;
            assert!((part.location.x - expected.x).abs() < EPS);
            assert!((part.location.z - expected.z).abs() < EPS);
        }
    }

    #[test]
    fn registers_three_parts() {
        let (renderer, controller) = setup();
        assert_eq!(renderer.len(), 3);
        let parts = controller.parts();
        assert!(renderer.contains(parts.body));
        assert!(renderer.contains(parts.turret));
        assert!(renderer.contains(parts.barrel));
        assert!(controller.projectiles().is_empty());
        assert!(!controller.is_paused());
    }

    #[test]
    fn unbound_keys_are_ignored() {
        let (mut renderer, mut controller) = setup();
        let before = location(&renderer, controller.parts().body);
        assert_eq!(controller.handle_key(&mut renderer, "x").unwrap(), None);
        assert_eq!(controller.handle_key(&mut renderer, "W").unwrap(), None);
        assert_eq!(location(&renderer, controller.parts().body), before);
        assert_eq!(controller.status().current(), None);
    }

    #[test]
    fn status_line_names_the_key() {
        let (mut renderer, mut controller) = setup();
        press(&mut renderer, &mut controller, &["ArrowUp"]);
        assert_eq!(controller.status().current(), Some("The Key \"ArrowUp\" is down."));
        press(&mut renderer, &mut controller, &["ㅈ"]);
        assert_eq!(controller.status().current(), Some("The Key \"W\" is down."));
        press(&mut renderer, &mut controller, &[" "]);
        assert_eq!(controller.status().current(), Some("The Key \" \" is down."));
    }

    #[test]
    fn forward_moves_along_body_facing_and_carries_turret() {
        let (mut renderer, mut controller) = setup();
        let parts = controller.parts();
        press(&mut renderer, &mut controller, &["ArrowUp", "ArrowUp"]);
        let body = location(&renderer, parts.body);
        assert!((body.x - 0.2).abs() < EPS);
        assert!(body.z.abs() < EPS);
        assert!((body.y - 0.075).abs() < EPS);
        assert!((location(&renderer, parts.turret).x - 0.2).abs() < EPS);
        assert!((location(&renderer, parts.barrel).y - 0.2).abs() < EPS);

        press(&mut renderer, &mut controller, &["ArrowLeft"; 5]);
        let start = location(&renderer, parts.body);
        press(&mut renderer, &mut controller, &["ArrowDown"]);
        let moved = location(&renderer, parts.body) - start;
        let yaw = 0.5f32;
        assert!((moved.x + 0.1 * yaw.cos()).abs() < EPS);
        assert!((moved.z - 0.1 * yaw.sin()).abs() < EPS);
        assert_turret_on_body(&renderer, &controller);
    }

    #[test]
    fn left_then_right_restores_yaw() {
        let (mut renderer, mut controller) = setup();
        let body = controller.parts().body;
        let original = rotation(&renderer, body).y;
        press(&mut renderer, &mut controller, &["ArrowLeft"]);
        assert!((rotation(&renderer, body).y - original - 0.1).abs() < EPS);
        press(&mut renderer, &mut controller, &["ArrowRight"]);
        assert!((rotation(&renderer, body).y - original).abs() < EPS);
    }

    #[test]
    fn body_motion_preserves_relative_turret_yaw() {
        let (mut renderer, mut controller) = setup();
        press(&mut renderer, &mut controller, &["a", "a", "ㅁ"]);
        let offset = controller.relative_turret_yaw(&renderer).unwrap();
        assert!((offset - 0.15).abs() < EPS);

        press(
            &mut renderer,
            &mut controller,
            &["ArrowUp", "ArrowLeft", "ArrowLeft", "ArrowDown", "ArrowRight", "ArrowUp"],
        );
        let after = controller.relative_turret_yaw(&renderer).unwrap();
        assert!((after - offset).abs() < EPS);
        let parts = controller.parts();
        assert_eq!(rotation(&renderer, parts.turret).y, rotation(&renderer, parts.barrel).y);
        assert_turret_on_body(&renderer, &controller);
    }

    #[test]
    fn turret_yaw_is_unclamped() {
        let (mut renderer, mut controller) = setup();
        press(&mut renderer, &mut controller, &["d"; 200]);
        let offset = controller.relative_turret_yaw(&renderer).unwrap();
        assert!((offset + 10.0).abs() < 1e-3);
        assert_turret_on_body(&renderer, &controller);
    }

    #[test]
    fn turret_pitch_is_clamped() {
        let (mut renderer, mut controller) = setup();
        let parts = controller.parts();
        press(&mut renderer, &mut controller, &["w"; 12]);
        assert_eq!(rotation(&renderer, parts.turret).z, 0.25);
        assert_eq!(rotation(&renderer, parts.barrel).z, 0.25);
        press(&mut renderer, &mut controller, &["s"; 30]);
        assert_eq!(rotation(&renderer, parts.turret).z, -0.25);
        press(&mut renderer, &mut controller, &["w"]);
        assert!((rotation(&renderer, parts.turret).z + 0.2).abs() < EPS);
    }

    #[test]
    fn fire_spawns_one_projectile_at_the_muzzle() {
        let (mut renderer, mut controller) = setup();
        press(&mut renderer, &mut controller, &["a", "w"]);
        let barrel = renderer.instance(controller.parts().barrel).unwrap().clone();

        press(&mut renderer, &mut controller, &[" "]);
        assert_eq!(controller.projectiles().len(), 1);
        assert_eq!(renderer.len(), 4);

        let projectile = controller.projectiles()[0];
        let shell = renderer.instance(projectile.instance).unwrap();
        let direction = facing(Vec3::new(0.0, barrel.rotation.y, 0.05 + 0.15));
        let tip = barrel.location + Vec3::Y * 0.15 + direction * 0.25;
        assert!(shell.location.abs_diff_eq(tip, EPS));
        assert!((projectile.velocity.length() - 0.08).abs() < EPS);
        assert!(projectile.velocity.normalize().abs_diff_eq(direction, EPS));
        assert_eq!(shell.scale, Vec3::splat(0.8));
        assert!(Arc::ptr_eq(&shell.mesh, &controller.shell_mesh));
    }

    #[test]
    fn projectile_falls_and_is_retired_once() {
        let (mut renderer, mut controller) = setup();
        press(&mut renderer, &mut controller, &[" "]);
        let id = controller.projectiles()[0].instance;

        let mut heights = Vec::new();
        let mut retired = 0;
        for _ in 0..1000 {
            if controller.projectiles().is_empty() {
                break;
            }
            let descending = controller.projectiles()[0].velocity.y < 0.0;
            retired += controller.update(&mut renderer).unwrap();
            if let Some(shell) = renderer.instance(id) {
                heights.push((descending, shell.location.y));
            }
        }

        assert_eq!(retired, 1);
        assert!(controller.projectiles().is_empty());
        assert!(!renderer.contains(id));
        assert_eq!(renderer.len(), 3);
        assert_eq!(renderer.backend().unwrap().released_count(), 1);

        let falling: Vec<f32> = heights
            .iter()
            .filter(|(descending, _)| *descending)
            .map(|(_, y)| *y)
            .collect();
        assert!(!falling.is_empty());
        assert!(falling.windows(2).all(|pair| pair[1] < pair[0]));

        assert_eq!(controller.update(&mut renderer).unwrap(), 0);
        assert_eq!(renderer.backend().unwrap().released_count(), 1);
    }

    #[test]
    fn simultaneous_landings_are_all_retired() {
        let (mut renderer, mut controller) = setup();
        press(&mut renderer, &mut controller, &[" ", " ", " "]);
        press(&mut renderer, &mut controller, &["s"; 5]);
        press(&mut renderer, &mut controller, &[" "]);
        assert_eq!(controller.projectiles().len(), 4);

        let mut retired_per_tick = Vec::new();
        while !controller.projectiles().is_empty() {
            let retired = controller.update(&mut renderer).unwrap();
            if retired > 0 {
                retired_per_tick.push(retired);
            }
            renderer.render().unwrap();
        }
        // The three identical shells land on the same tick.
        assert!(retired_per_tick.contains(&3));
        assert_eq!(retired_per_tick.iter().sum::<usize>(), 4);
        assert_eq!(renderer.len(), 3);
        assert_eq!(renderer.backend().unwrap().live_resources(), 3);
    }

    #[test]
    fn pause_toggles_twice_back_to_running() {
        let (mut renderer, mut controller) = setup();
        press(&mut renderer, &mut controller, &["p"]);
        assert!(controller.is_paused());
        assert_eq!(controller.status().current(), Some("The Key \"P\" is down."));
        press(&mut renderer, &mut controller, &["ㅔ"]);
        assert!(!controller.is_paused());
    }

    #[test]
    fn missing_part_is_reported() {
        let (mut renderer, mut controller) = setup();
        let turret = controller.parts().turret;
        renderer.remove_model(turret).unwrap();
        let err = controller.handle_key(&mut renderer, "ArrowLeft").unwrap_err();
        assert!(matches!(err, RenderError::UnknownInstance(id) if id == turret));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{ "muzzle_speed": 0.2, "gravity": 0.01 }"#).unwrap();
        assert_eq!(config.muzzle_speed, 0.2);
        assert_eq!(config.gravity, 0.01);
        assert_eq!(config.pitch_limit, 0.25);
    }
}

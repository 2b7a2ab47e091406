use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Logical tank command produced by a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    TurretLeft,
    TurretRight,
    TurretUp,
    TurretDown,
    Fire,
    TogglePause,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Forward,
        Action::Backward,
        Action::TurnLeft,
        Action::TurnRight,
        Action::TurretLeft,
        Action::TurretRight,
        Action::TurretUp,
        Action::TurretDown,
        Action::Fire,
        Action::TogglePause,
    ];

    /// Key name shown in the status line for this action.
    pub fn label(self) -> &'static str {
        match self {
            Action::Forward => "ArrowUp",
            Action::Backward => "ArrowDown",
            Action::TurnLeft => "ArrowLeft",
            Action::TurnRight => "ArrowRight",
            Action::TurretLeft => "A",
            Action::TurretRight => "D",
            Action::TurretUp => "W",
            Action::TurretDown => "S",
            Action::Fire => " ",
            Action::TogglePause => "P",
        }
    }
}

/// Declarative map from key names to actions.
///
/// Key names are the browser's `KeyboardEvent.key` values and are matched
/// case-sensitively; several names may trigger the same action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    keys: HashMap<String, Action>,
}

impl KeyBindings {
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Binds every key in `keys` to `action`, replacing earlier bindings of those keys.
    pub fn bind<I, K>(&mut self, keys: I, action: Action) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            self.keys.insert(key.into(), action);
        }
        self
    }

    pub fn unbind(&mut self, key: &str) -> Option<Action> {
        self.keys.remove(key)
    }

    pub fn action_for(&self, key: &str) -> Option<Action> {
        self.keys.get(key).copied()
    }

    /// Keys bound to `action`, sorted for stable output.
    pub fn keys_for(&self, action: Action) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .keys
            .iter()
            .filter(|(_, bound)| **bound == action)
            .map(|(key, _)| key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for KeyBindings {
    /// Arrow keys drive the hull, WASD (and the same keys on a Korean 2-set
    /// layout) aim the turret, space fires and `p` pauses.
    fn default() -> Self {
        let mut bindings = Self::empty();
        bindings
            .bind(["ArrowUp"], Action::Forward)
            .bind(["ArrowDown"], Action::Backward)
            .bind(["ArrowLeft"], Action::TurnLeft)
            .bind(["ArrowRight"], Action::TurnRight)
            .bind(["a", "ㅁ"], Action::TurretLeft)
            .bind(["d", "ㅇ"], Action::TurretRight)
            .bind(["w", "ㅈ"], Action::TurretUp)
            .bind(["s", "ㄴ"], Action::TurretDown)
            .bind([" "], Action::Fire)
            .bind(["p", "ㅔ"], Action::TogglePause);
        bindings
    }
}

/// Normalizes a key token typed on a command line into a key name.
pub fn key_from_token(token: &str) -> String {
    match token {
        "Space" | "space" => " ".to_string(),
        other => other.to_string(),
    }
}

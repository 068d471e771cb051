//! The actions a player can attempt.

use std::fmt;

/// A point in the world.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Where a player is and which way they face.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Location {
    pub position: Position,
    pub yaw: f32,
    pub pitch: f32,
}

impl Location {
    pub fn at(position: Position) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// The same position, facing another way.
    pub fn facing(self, yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch, ..self }
    }
}

/// Something a player is trying to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Walking, or just turning their head.
    Move { from: Location, to: Location },
    /// Sending a chat line.
    Chat { message: String },
    /// Breaking, placing, or using something in the world.
    Interact,
    /// Running a command. `line` is what they typed, with or without the
    /// leading `/`.
    Command { line: String },
    /// Taking damage. The player didn't choose this, but it is still gated.
    Damage,
    /// Moving to another server. `None` when no target was named.
    Transfer { target: Option<String> },
}

/// The discriminant of an [`Action`], used to look up its rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Move,
    Chat,
    Interact,
    Command,
    Damage,
    Transfer,
}

impl Action {
    /// Which kind of action this is.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Move { .. } => ActionKind::Move,
            Self::Chat { .. } => ActionKind::Chat,
            Self::Interact => ActionKind::Interact,
            Self::Command { .. } => ActionKind::Command,
            Self::Damage => ActionKind::Damage,
            Self::Transfer { .. } => ActionKind::Transfer,
        }
    }

    /// Reads a proxy `server [name]` command as a transfer.
    ///
    /// Returns `None` for any other command. A bare `server` becomes a
    /// transfer with no target.
    pub fn from_server_command(line: &str) -> Option<Self> {
        let mut parts = line.trim().trim_start_matches('/').split_whitespace();
        if !parts.next()?.eq_ignore_ascii_case("server") {
            return None;
        }
        Some(Self::Transfer {
            target: parts.next().map(str::to_string),
        })
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Move => "move",
            Self::Chat => "chat",
            Self::Interact => "interact",
            Self::Command => "command",
            Self::Damage => "damage",
            Self::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_server_command_with_target() {
        assert_eq!(
            Action::from_server_command("server survival"),
            Some(Action::Transfer {
                target: Some("survival".into())
            })
        );
        assert_eq!(
            Action::from_server_command("/SERVER Lobby"),
            Some(Action::Transfer {
                target: Some("Lobby".into())
            })
        );
    }

    #[test]
    fn test_from_server_command_bare_has_no_target() {
        assert_eq!(
            Action::from_server_command("server"),
            Some(Action::Transfer { target: None })
        );
    }

    #[test]
    fn test_from_server_command_other_command_is_none() {
        assert_eq!(Action::from_server_command("servers"), None);
        assert_eq!(Action::from_server_command("login 123456"), None);
        assert_eq!(Action::from_server_command(""), None);
    }
}

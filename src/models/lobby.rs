//! Lobby snapshot produced by the resolver.

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

/// Lobby phase, derived from the remote match status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Voting,
    Configuring,
    Ready,
    Finished,
}

impl Phase {
    /// Map a remote status string. Anything unrecognised (including a
    /// missing status) is treated as finished.
    pub fn from_status(status: Option<&str>) -> Self {
        match status.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("VOTING") => Phase::Voting,
            Some(s) if s.eq_ignore_ascii_case("CONFIGURING") => Phase::Configuring,
            Some(s) if s.eq_ignore_ascii_case("READY") => Phase::Ready,
            _ => Phase::Finished,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Voting => write!(f, "voting"),
            Phase::Configuring => write!(f, "configuring"),
            Phase::Ready => write!(f, "ready"),
            Phase::Finished => write!(f, "finished"),
        }
    }
}

/// Which roster column a team occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Non-owning reference into a host document.
///
/// Stored as element-child indices from the root element. A path is only
/// meaningful for the document it was taken from; after the host re-renders
/// it may point at a different node or at nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// Build the path leading to `element`.
    pub fn of(element: ElementRef<'_>) -> Self {
        let mut indices = Vec::new();
        let mut current = *element;

        while let Some(parent) = current.parent() {
            if !parent.value().is_element() {
                break;
            }
            let index = parent
                .children()
                .filter(|child| child.value().is_element())
                .position(|child| child.id() == current.id())
                .unwrap_or(0);
            indices.push(index);
            current = parent;
        }

        indices.reverse();
        Self(indices)
    }

    /// Find the element this path points at, if it still exists.
    pub fn locate<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let mut current = document.root_element();
        for &index in &self.0 {
            current = current.children().filter_map(ElementRef::wrap).nth(index)?;
        }
        Some(current)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Faction key on the remote match (e.g. `faction1`)
    pub id: String,
    pub name: String,
    pub side: Side,
    pub container: NodePath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Lowercased display name
    pub id: String,
    pub name: String,
    /// Faction key of the team this player was found under
    pub team_id: String,
    pub container: NodePath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyMap {
    /// Stable map guid from the remote voting data
    pub id: String,
    pub name: String,
    pub container: NodePath,
}

/// A single reading of the lobby. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub id: String,
    pub phase: Phase,
    pub teams: [Team; 2],
    pub players: Vec<Player>,
    pub maps: Vec<LobbyMap>,
}

impl LobbySnapshot {
    pub fn team(&self, side: Side) -> &Team {
        match side {
            Side::Left => &self.teams[0],
            Side::Right => &self.teams[1],
        }
    }

    pub fn players_of<'a>(&'a self, team_id: &'a str) -> impl Iterator<Item = &'a Player> + 'a {
        self.players.iter().filter(move |p| p.team_id == team_id)
    }
}

//! Lobby state resolver.
//!
//! Turns the host page into a [`LobbySnapshot`]: rosters and map containers
//! come from the DOM, phase and map guids from the remote match. The
//! resolver never writes to the document.

pub mod layout;
pub mod page;

use tracing::debug;

use crate::fetch::api::MatchDetails;
use crate::fetch::MatchApi;
use crate::models::{LobbyMap, LobbySnapshot, Phase, Player, Side, Team};

pub use layout::{read_layout, PageLayout, RosterLayout, RosterShape};
pub use page::HostPage;

const FACTIONS: [&str; 2] = ["faction1", "faction2"];

pub struct LobbyResolver {
    api: MatchApi,
}

impl LobbyResolver {
    pub fn new(api: MatchApi) -> Self {
        Self { api }
    }

    /// Resolve the lobby, or `None` if it is not ready yet.
    ///
    /// Not-ready covers a missing lobby id, missing lobby containers, and a
    /// match record that could not be fetched this time around.
    pub async fn resolve(&self, page: &HostPage) -> Option<LobbySnapshot> {
        let Some(lobby_id) = page.lobby_id() else {
            debug!("No lobby id in {}", page.url);
            return None;
        };

        // Parsed tree stays inside this block.
        let layout = {
            let document = page.parse();
            read_layout(&document)
        };
        let Some(layout) = layout else {
            debug!("Lobby {} not rendered yet", lobby_id);
            return None;
        };

        let details = self.api.match_details(&lobby_id).await?;
        Some(build_snapshot(lobby_id, layout, &details))
    }
}

/// Combine the DOM layout with the remote match record.
pub fn build_snapshot(lobby_id: String, layout: PageLayout, details: &MatchDetails) -> LobbySnapshot {
    let phase = Phase::from_status(details.status.as_deref());
    let [left, right] = layout.rosters;

    let mut players = Vec::new();
    let mut team_for = |roster: RosterLayout, side: Side, faction: &str| -> Team {
        let name = details
            .teams
            .get(faction)
            .map(|t| t.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or(roster.header_text);

        players.extend(roster.players.into_iter().map(|node| Player {
            id: node.name.to_lowercase(),
            name: node.name,
            team_id: faction.to_string(),
            container: node.path,
        }));

        Team {
            id: faction.to_string(),
            name,
            side,
            container: roster.header,
        }
    };
    let teams = [
        team_for(left, Side::Left, FACTIONS[0]),
        team_for(right, Side::Right, FACTIONS[1]),
    ];

    let map_nodes = match phase {
        Phase::Voting => layout.voting_maps,
        Phase::Configuring | Phase::Ready | Phase::Finished => {
            layout.active_map.into_iter().collect()
        }
    };

    let maps = map_nodes
        .into_iter()
        .filter_map(|node| match details.map_guid(&node.name) {
            Some(guid) => Some(LobbyMap {
                id: guid.to_string(),
                name: node.name,
                container: node.path,
            }),
            None => {
                debug!("No guid for map {:?}; skipping", node.name);
                None
            }
        })
        .collect();

    LobbySnapshot {
        id: lobby_id,
        phase,
        teams,
        players,
        maps,
    }
}

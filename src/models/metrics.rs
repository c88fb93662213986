//! Derived metrics, recomputed wholesale from a `SourceModel`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counters and rates for one map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapMetrics {
    /// Matches played on this map
    pub matches: u32,
    pub wins: u32,
    pub win_rate: f64,

    /// Matches with veto data for the faction
    pub veto_matches: u32,
    pub picks: u32,
    pub drops: u32,
    pub pick_rate: f64,
    pub drop_rate: f64,

    pub kills: u32,
    pub deaths: u32,
    pub headshots: u32,
    pub kd_ratio: f64,
    pub headshot_rate: f64,
}

/// Counters and rates for one player across all their matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerMetrics {
    pub id: String,
    pub name: String,

    pub matches: u32,
    pub wins: u32,
    pub win_rate: f64,

    pub kills: u32,
    pub deaths: u32,
    pub headshots: u32,
    pub rounds: u32,
    pub kd_ratio: f64,
    pub kr_ratio: f64,
    pub avg_kills: f64,
    pub headshot_rate: f64,

    /// Same reductions split per map guid
    pub maps: BTreeMap<String, MapMetrics>,
}

/// Team-level reductions. Shared matches are counted once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub name: String,
    /// Distinct matches that passed the player-count floor
    pub matches: u32,
    pub maps: BTreeMap<String, MapMetrics>,
    pub players: Vec<PlayerMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsAggregate {
    pub match_id: String,
    pub teams: BTreeMap<String, TeamMetrics>,
}

impl MetricsAggregate {
    pub fn player(&self, player_id: &str) -> Option<&PlayerMetrics> {
        self.teams
            .values()
            .flat_map(|t| t.players.iter())
            .find(|p| p.id == player_id)
    }

    /// Look a player up by lowercased display name, which is how the
    /// resolver identifies lobby players.
    pub fn player_by_name(&self, name: &str) -> Option<&PlayerMetrics> {
        let wanted = name.to_lowercase();
        self.teams
            .values()
            .flat_map(|t| t.players.iter())
            .find(|p| p.name.to_lowercase() == wanted)
    }
}

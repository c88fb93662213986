//! Typed wrappers for the remote resources the engine reads.
//!
//! All endpoint specifics live in this module so path or shape changes are
//! fixed in one place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Endpoint, RemoteClient, RequestDescriptor};
use crate::models::{RangeOptions, Veto};

// ── Match details (web endpoint, enveloped) ────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RosterMember {
    #[serde(alias = "player_id")]
    pub id: String,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchTeam {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub leader: Option<String>,
    #[serde(default)]
    pub roster: Vec<RosterMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapEntity {
    pub guid: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapVoting {
    #[serde(default)]
    pub entities: Vec<MapEntity>,
    #[serde(default)]
    pub pick: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Voting {
    #[serde(default)]
    pub map: Option<MapVoting>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchResults {
    #[serde(default)]
    pub winner: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchDetails {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Keyed by faction (`faction1`, `faction2`)
    #[serde(default)]
    pub teams: BTreeMap<String, MatchTeam>,
    #[serde(default)]
    pub voting: Option<Voting>,
    #[serde(default)]
    pub results: Option<MatchResults>,
}

impl MatchDetails {
    pub fn map_entities(&self) -> &[MapEntity] {
        self.voting
            .as_ref()
            .and_then(|v| v.map.as_ref())
            .map(|m| m.entities.as_slice())
            .unwrap_or(&[])
    }

    /// Guid of a map by display name (case-insensitive).
    pub fn map_guid(&self, display_name: &str) -> Option<&str> {
        let wanted = display_name.trim();
        self.map_entities()
            .iter()
            .find(|e| e.name.trim().eq_ignore_ascii_case(wanted))
            .map(|e| e.guid.as_str())
    }

    pub fn picked_map(&self) -> Option<&str> {
        self.voting
            .as_ref()
            .and_then(|v| v.map.as_ref())
            .and_then(|m| m.pick.first())
            .map(String::as_str)
    }

    /// Faction key of the team `player_id` played for.
    pub fn faction_of(&self, player_id: &str) -> Option<&str> {
        self.teams
            .iter()
            .find(|(_, team)| team.roster.iter().any(|m| m.id == player_id))
            .map(|(faction, _)| faction.as_str())
    }

    pub fn winner(&self) -> Option<&str> {
        self.results.as_ref().and_then(|r| r.winner.as_deref())
    }
}

// ── Player history (open endpoint) ─────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryItem {
    pub match_id: String,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
}

impl HistoryItem {
    pub fn timestamp(&self) -> i64 {
        self.started_at.or(self.finished_at).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub items: Vec<HistoryItem>,
}

// ── Match stats (open endpoint) ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StatsPlayer {
    pub player_id: String,
    #[serde(default)]
    pub player_stats: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsTeam {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub players: Vec<StatsPlayer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsRound {
    #[serde(default)]
    pub round_stats: BTreeMap<String, Value>,
    #[serde(default)]
    pub teams: Vec<StatsTeam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchStats {
    #[serde(default)]
    pub rounds: Vec<StatsRound>,
}

impl MatchStats {
    /// Stats of one player from the first round block, values stringified.
    pub fn player_stats(&self, player_id: &str) -> Option<BTreeMap<String, String>> {
        let round = self.rounds.first()?;
        let mut stats = round
            .teams
            .iter()
            .flat_map(|t| t.players.iter())
            .find(|p| p.player_id == player_id)
            .map(|p| stringify(&p.player_stats))?;

        // Round count sits at round level but K/R needs it per player.
        if let Some(rounds) = round.round_stats.get("Rounds") {
            stats
                .entry("Rounds".to_string())
                .or_insert_with(|| value_to_string(rounds));
        }
        Some(stats)
    }
}

fn stringify(map: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Veto history (web endpoint, enveloped) ─────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct VetoEntity {
    pub guid: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub random: bool,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub selected_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VetoTicket {
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub entities: Vec<VetoEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VetoHistory {
    #[serde(default)]
    pub tickets: Vec<VetoTicket>,
}

impl VetoHistory {
    /// Non-random map vetos made by `faction`.
    pub fn map_vetos(&self, faction: &str) -> Vec<Veto> {
        self.tickets
            .iter()
            .filter(|t| t.entity_type.eq_ignore_ascii_case("map"))
            .flat_map(|t| t.entities.iter())
            .filter(|e| !e.random && e.selected_by == faction)
            .map(|e| Veto {
                guid: e.guid.clone(),
                status: e.status.clone(),
                random: e.random,
                round: e.round,
                selected_by: e.selected_by.clone(),
            })
            .collect()
    }
}

// ── API client ─────────────────────────────────────────────────────────────

/// Typed access to the remote service.
#[derive(Clone)]
pub struct MatchApi {
    client: RemoteClient,
    game: String,
}

impl MatchApi {
    pub fn new(client: RemoteClient, game: impl Into<String>) -> Self {
        Self {
            client,
            game: game.into(),
        }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.client.clock().now()
    }

    pub async fn match_details(&self, match_id: &str) -> Option<MatchDetails> {
        let descriptor =
            RequestDescriptor::new(Endpoint::Web, format!("match/v2/match/{}", match_id))
                .unwrapped();
        self.client.fetch(&descriptor).await
    }

    /// Player history inside the option-derived count and time windows.
    pub async fn player_history(
        &self,
        player_id: &str,
        options: &RangeOptions,
    ) -> Option<Vec<HistoryItem>> {
        let (offset, limit) = options.count_window();
        let (from, to) = options.time_window(self.now());

        let descriptor =
            RequestDescriptor::new(Endpoint::Open, format!("players/{}/history", player_id))
                .query("game", &self.game)
                .query("from", from)
                .query("to", to)
                .query("offset", offset)
                .query("limit", limit);

        let page: HistoryPage = self.client.fetch(&descriptor).await?;
        let items: Vec<HistoryItem> = page
            .items
            .into_iter()
            .filter(|item| {
                let ts = item.timestamp();
                ts == 0 || (from..=to).contains(&ts)
            })
            .take(limit as usize)
            .collect();

        debug!("History for {}: {} matches", player_id, items.len());
        Some(items)
    }

    pub async fn match_stats(&self, match_id: &str) -> Option<MatchStats> {
        let descriptor =
            RequestDescriptor::new(Endpoint::Open, format!("matches/{}/stats", match_id));
        self.client.fetch(&descriptor).await
    }

    pub async fn veto_history(&self, match_id: &str) -> Option<VetoHistory> {
        let descriptor = RequestDescriptor::new(
            Endpoint::Web,
            format!("democracy/v1/match/{}/history", match_id),
        )
        .unwrapped();
        self.client.fetch(&descriptor).await
    }
}

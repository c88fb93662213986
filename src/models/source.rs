//! Raw aggregation input assembled from remote history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A map veto action attributed to a faction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Veto {
    pub guid: String,
    /// `drop` or `pick`
    pub status: String,
    pub random: bool,
    pub round: u32,
    pub selected_by: String,
}

impl Veto {
    pub fn is_drop(&self) -> bool {
        self.status.eq_ignore_ascii_case("drop")
    }

    pub fn is_pick(&self) -> bool {
        self.status.eq_ignore_ascii_case("pick")
    }
}

/// One historical match from a player's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub match_id: String,
    /// Unix seconds
    pub timestamp: i64,
    /// Guid of the map that was played, if known
    pub map_pick: Option<String>,
    pub is_winner: bool,
    pub is_leader: bool,
    /// Player ids of the player's own faction in that match
    pub roster: Vec<String>,
    /// Free-form per-player stats for the match (`None` when unavailable)
    pub stats: Option<BTreeMap<String, String>>,
    /// Non-random vetos made by the player's own faction
    pub vetos: Vec<Veto>,
}

impl MatchRecord {
    /// Numeric stat lookup; stats arrive as strings.
    pub fn stat(&self, key: &str) -> Option<f64> {
        self.stats
            .as_ref()
            .and_then(|s| s.get(key))
            .and_then(|v| v.trim().parse::<f64>().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub matches: Vec<MatchRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTeam {
    pub name: String,
    pub leader: String,
    pub roster: Vec<RosterEntry>,
}

/// Everything one aggregation pass collected, keyed by faction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceModel {
    pub match_id: String,
    pub teams: BTreeMap<String, SourceTeam>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_parses_strings() {
        let record = MatchRecord {
            match_id: "m1".to_string(),
            timestamp: 0,
            map_pick: None,
            is_winner: true,
            is_leader: false,
            roster: vec![],
            stats: Some(BTreeMap::from([
                ("Kills".to_string(), "21".to_string()),
                ("K/D Ratio".to_string(), "1.4".to_string()),
                ("Broken".to_string(), "n/a".to_string()),
            ])),
            vetos: vec![],
        };

        assert_eq!(record.stat("Kills"), Some(21.0));
        assert_eq!(record.stat("K/D Ratio"), Some(1.4));
        assert_eq!(record.stat("Broken"), None);
        assert_eq!(record.stat("Missing"), None);
    }

    #[test]
    fn test_veto_status() {
        let veto = Veto {
            guid: "de_dust2".to_string(),
            status: "DROP".to_string(),
            random: false,
            round: 1,
            selected_by: "faction1".to_string(),
        };
        assert!(veto.is_drop());
        assert!(!veto.is_pick());
    }
}

//! Metrics reduction.
//!
//! Turns a completed `SourceModel` into a `MetricsAggregate`. Everything
//! here is a pure function of its inputs:
//! - Per-player totals, rates and per-map splits
//! - Per-team map tendencies over distinct shared matches
//! - Pick and drop rates from the faction's own vetos

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{
    MapMetrics, MatchRecord, MetricsAggregate, PlayerMetrics, RangeOptions, RosterEntry,
    SourceModel, SourceTeam, TeamMetrics,
};

pub const STAT_KILLS: &str = "Kills";
pub const STAT_DEATHS: &str = "Deaths";
pub const STAT_HEADSHOTS: &str = "Headshots";
pub const STAT_ROUNDS: &str = "Rounds";

/// Share of `part` in `total`, zero when there is nothing to divide by.
pub fn calculate_rate(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Ratio used for K/D and K/R. With no denominator the numerator is returned
/// as is, so a deathless player reads as their kill count.
pub fn calculate_ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        numerator as f64
    } else {
        numerator as f64 / denominator as f64
    }
}

fn stat_u32(record: &MatchRecord, key: &str) -> u32 {
    record
        .stat(key)
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.round() as u32)
        .unwrap_or(0)
}

/// Raw counters accumulated before rates are derived.
#[derive(Debug, Default)]
struct Tally {
    matches: u32,
    wins: u32,
    kills: u32,
    deaths: u32,
    headshots: u32,
}

impl Tally {
    fn add(&mut self, record: &MatchRecord) {
        self.matches += 1;
        if record.is_winner {
            self.wins += 1;
        }
        self.kills = self.kills.saturating_add(stat_u32(record, STAT_KILLS));
        self.deaths = self.deaths.saturating_add(stat_u32(record, STAT_DEATHS));
        self.headshots = self.headshots.saturating_add(stat_u32(record, STAT_HEADSHOTS));
    }
}

#[derive(Debug, Default)]
struct MapTally {
    played: Tally,
    picks: u32,
    drops: u32,
}

/// Per-map counters plus the number of matches that carried veto data.
#[derive(Debug, Default)]
struct MapBook {
    maps: BTreeMap<String, MapTally>,
    veto_matches: u32,
}

impl MapBook {
    fn add_played(&mut self, record: &MatchRecord) {
        if let Some(map) = &record.map_pick {
            self.maps.entry(map.clone()).or_default().played.add(record);
        }
    }

    fn add_vetos(&mut self, record: &MatchRecord) {
        if record.vetos.is_empty() {
            return;
        }
        self.veto_matches += 1;
        for veto in &record.vetos {
            let tally = self.maps.entry(veto.guid.clone()).or_default();
            if veto.is_pick() {
                tally.picks += 1;
            } else if veto.is_drop() {
                tally.drops += 1;
            }
        }
    }

    fn finish(self) -> BTreeMap<String, MapMetrics> {
        let veto_matches = self.veto_matches;
        self.maps
            .into_iter()
            .map(|(guid, t)| {
                let metrics = MapMetrics {
                    matches: t.played.matches,
                    wins: t.played.wins,
                    win_rate: calculate_rate(t.played.wins, t.played.matches),
                    veto_matches,
                    picks: t.picks,
                    drops: t.drops,
                    pick_rate: calculate_rate(t.picks, veto_matches),
                    drop_rate: calculate_rate(t.drops, veto_matches),
                    kills: t.played.kills,
                    deaths: t.played.deaths,
                    headshots: t.played.headshots,
                    kd_ratio: calculate_ratio(t.played.kills, t.played.deaths),
                    headshot_rate: calculate_rate(t.played.headshots, t.played.kills),
                };
                (guid, metrics)
            })
            .collect()
    }
}

/// Reduce one roster entry. An empty history yields zeroed metrics.
pub fn reduce_player(entry: &RosterEntry) -> PlayerMetrics {
    let mut total = Tally::default();
    let mut rounds: u32 = 0;
    let mut book = MapBook::default();

    for record in &entry.matches {
        total.add(record);
        rounds = rounds.saturating_add(stat_u32(record, STAT_ROUNDS));
        book.add_played(record);
        book.add_vetos(record);
    }

    PlayerMetrics {
        id: entry.id.clone(),
        name: entry.name.clone(),
        matches: total.matches,
        wins: total.wins,
        win_rate: calculate_rate(total.wins, total.matches),
        kills: total.kills,
        deaths: total.deaths,
        headshots: total.headshots,
        rounds,
        kd_ratio: calculate_ratio(total.kills, total.deaths),
        kr_ratio: if rounds == 0 {
            0.0
        } else {
            calculate_ratio(total.kills, rounds)
        },
        avg_kills: if total.matches == 0 {
            0.0
        } else {
            calculate_ratio(total.kills, total.matches)
        },
        headshot_rate: calculate_rate(total.headshots, total.kills),
        maps: book.finish(),
    }
}

/// Reduce a team over the distinct matches that at least `threshold`
/// current roster members played together.
pub fn reduce_team(team: &SourceTeam, threshold: usize) -> TeamMetrics {
    // match id -> records of current roster members in that match
    let mut shared: HashMap<&str, Vec<&MatchRecord>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for entry in &team.roster {
        let mut seen = HashSet::new();
        for record in &entry.matches {
            // A player listing the same match twice still counts once
            if !seen.insert(record.match_id.as_str()) {
                continue;
            }
            let records = shared.entry(record.match_id.as_str()).or_insert_with(|| {
                order.push(record.match_id.as_str());
                Vec::new()
            });
            records.push(record);
        }
    }

    let mut book = MapBook::default();
    let mut matches = 0;

    for match_id in order {
        let records = &shared[match_id];
        if records.len() < threshold {
            continue;
        }
        matches += 1;

        let mut combined = records[0].clone();
        combined.is_winner = records.iter().any(|r| r.is_winner);
        combined.map_pick = records.iter().find_map(|r| r.map_pick.clone());
        combined.stats = None;
        if let Some(map) = &combined.map_pick {
            let tally = book.maps.entry(map.clone()).or_default();
            tally.played.add(&combined);
            for record in records {
                tally.played.kills = tally.played.kills
                    .saturating_add(stat_u32(record, STAT_KILLS));
                tally.played.deaths = tally.played.deaths
                    .saturating_add(stat_u32(record, STAT_DEATHS));
                tally.played.headshots = tally.played.headshots
                    .saturating_add(stat_u32(record, STAT_HEADSHOTS));
            }
        }

        // Vetos belong to the faction, so any member's copy will do
        if let Some(with_vetos) = records.iter().find(|r| !r.vetos.is_empty()) {
            book.add_vetos(with_vetos);
        }
    }

    TeamMetrics {
        name: team.name.clone(),
        matches,
        maps: book.finish(),
        players: team.roster.iter().map(reduce_player).collect(),
    }
}

/// Reduce a whole `SourceModel`.
pub fn reduce(source: &SourceModel, options: &RangeOptions) -> MetricsAggregate {
    let teams = source
        .teams
        .iter()
        .map(|(faction, team)| {
            let threshold = options.player_min.threshold(team.roster.len());
            (faction.clone(), reduce_team(team, threshold))
        })
        .collect();

    MetricsAggregate {
        match_id: source.match_id.clone(),
        teams,
    }
}

//! Metrics aggregation pipeline.
//!
//! One pass fetches the lobby match, then every player's history
//! concurrently, then for each historical match its record, the player's
//! stats and the faction's vetos. Only the lobby match is required; every
//! other failure degrades to an empty value.

use std::collections::BTreeMap;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::calculate;
use crate::fetch::api::{HistoryItem, MatchDetails};
use crate::fetch::MatchApi;
use crate::models::{MatchRecord, MetricsAggregate, RangeOptions, RosterEntry, SourceModel, SourceTeam};

/// Collect the `SourceModel` for `match_id`, or `None` when the match
/// itself cannot be loaded.
pub async fn aggregate(
    api: &MatchApi,
    match_id: &str,
    options: &RangeOptions,
) -> Option<SourceModel> {
    let Some(root) = api.match_details(match_id).await else {
        warn!("Match {} unavailable; aggregation aborted", match_id);
        return None;
    };

    let started = Instant::now();

    let players = root.teams.iter().flat_map(|(faction, team)| {
        team.roster.iter().map(move |member| (faction, member))
    });
    let histories = join_all(players.map(|(faction, member)| async move {
        let matches = player_matches(api, &member.id, options).await;
        let entry = RosterEntry {
            id: member.id.clone(),
            name: member.nickname.clone(),
            matches,
        };
        (faction.clone(), entry)
    }))
    .await;

    let mut teams: BTreeMap<String, SourceTeam> = root
        .teams
        .iter()
        .map(|(faction, team)| {
            let source = SourceTeam {
                name: team.name.clone(),
                leader: team.leader.clone().unwrap_or_default(),
                roster: Vec::with_capacity(team.roster.len()),
            };
            (faction.clone(), source)
        })
        .collect();
    for (faction, entry) in histories {
        if let Some(team) = teams.get_mut(&faction) {
            team.roster.push(entry);
        }
    }

    info!(
        "Aggregated match {}: {} teams, {} records in {:?}",
        match_id,
        teams.len(),
        teams
            .values()
            .flat_map(|t| t.roster.iter())
            .map(|e| e.matches.len())
            .sum::<usize>(),
        started.elapsed()
    );

    Some(SourceModel {
        match_id: root.id.clone(),
        teams,
    })
}

/// Aggregate and reduce in one go.
pub async fn compute(
    api: &MatchApi,
    match_id: &str,
    options: &RangeOptions,
) -> Option<MetricsAggregate> {
    let source = aggregate(api, match_id, options).await?;
    Some(calculate::reduce(&source, options))
}

/// Historical matches of one player. A failed history is an empty list.
async fn player_matches(api: &MatchApi, player_id: &str, options: &RangeOptions) -> Vec<MatchRecord> {
    let items = match api.player_history(player_id, options).await {
        Some(items) => items,
        None => {
            debug!("No history for {}", player_id);
            return Vec::new();
        }
    };

    join_all(items.iter().map(|item| match_record(api, player_id, item)))
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// One historical match from `player_id`'s side. Dropped when the match
/// record cannot be loaded.
async fn match_record(api: &MatchApi, player_id: &str, item: &HistoryItem) -> Option<MatchRecord> {
    let (details, stats, vetos) = tokio::join!(
        api.match_details(&item.match_id),
        api.match_stats(&item.match_id),
        api.veto_history(&item.match_id),
    );

    let Some(details) = details else {
        debug!("Dropping match {} for {}", item.match_id, player_id);
        return None;
    };

    let faction = details.faction_of(player_id).map(str::to_string);
    Some(MatchRecord {
        match_id: item.match_id.clone(),
        timestamp: item.timestamp(),
        map_pick: details.picked_map().map(str::to_string),
        is_winner: is_winner(&details, faction.as_deref()),
        is_leader: faction
            .as_deref()
            .and_then(|f| details.teams.get(f))
            .and_then(|t| t.leader.as_deref())
            == Some(player_id),
        roster: faction
            .as_deref()
            .and_then(|f| details.teams.get(f))
            .map(|t| t.roster.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default(),
        stats: stats.and_then(|s| s.player_stats(player_id)),
        vetos: match (&vetos, faction.as_deref()) {
            (Some(history), Some(faction)) => history.map_vetos(faction),
            _ => Vec::new(),
        },
    })
}

fn is_winner(details: &MatchDetails, faction: Option<&str>) -> bool {
    match (details.winner(), faction) {
        (Some(winner), Some(faction)) => winner == faction,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::fetch::ManualClock;
    use crate::models::{MatchCount, TimeSpan};
    use crate::testing::{client_with, remote, scenario, MockReply, MockTransport};

    fn api_with(transport: Arc<MockTransport>) -> MatchApi {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        MatchApi::new(client_with(transport, clock), "cs2")
    }

    fn options() -> RangeOptions {
        RangeOptions {
            match_count: MatchCount::Twenty,
            time_span: TimeSpan::ThreeMonths,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_voting_lobby() {
        let transport = Arc::new(MockTransport::new());
        scenario::install(&transport);
        let api = api_with(transport.clone());
        let now = api.now().timestamp();

        let source = aggregate(&api, remote::MATCH_ID, &options()).await.unwrap();

        assert_eq!(source.teams.len(), 2);
        for team in source.teams.values() {
            assert_eq!(team.roster.len(), 5);
            for entry in &team.roster {
                assert!(!entry.matches.is_empty());
                assert!(entry.matches.len() <= 20);
                for record in &entry.matches {
                    assert!(record.timestamp >= now - 90 * 86_400);
                    assert!(record.timestamp <= now);
                }
            }
        }

        // Ten players share the same twenty matches; each is fetched once
        assert_eq!(transport.calls_matching("/match/v2/match/h"), 20);
        assert_eq!(transport.calls_matching("/players/"), 10);
    }

    #[tokio::test]
    async fn test_records_are_seen_from_the_player_side() {
        let transport = Arc::new(MockTransport::new());
        scenario::install(&transport);
        let api = api_with(transport);

        let source = aggregate(&api, remote::MATCH_ID, &options()).await.unwrap();

        let alice = &source.teams["faction1"].roster[0];
        assert_eq!(alice.id, "id-alice");
        assert_eq!(alice.name, "Alice");
        let first = &alice.matches[0];
        assert_eq!(first.match_id, "h0");
        assert!(first.is_winner);
        assert!(first.is_leader);
        assert_eq!(first.roster.len(), 5);
        assert_eq!(first.map_pick.as_deref(), Some("de_mirage"));
        assert_eq!(first.stat("Kills"), Some(20.0));
        let vetos: Vec<&str> = first.vetos.iter().map(|v| v.guid.as_str()).collect();
        assert_eq!(vetos, vec!["de_nuke", "de_mirage"]);

        let frank = &source.teams["faction2"].roster[0];
        assert!(!frank.matches[0].is_winner);
        assert!(frank.matches[0].vetos.is_empty());
        assert_eq!(source.teams["faction2"].leader, "id-frank");
    }

    #[tokio::test]
    async fn test_failed_history_is_empty() {
        let transport = Arc::new(MockTransport::new());
        transport.route("/players/id-bob/", |_, _| MockReply::status(500));
        scenario::install(&transport);
        let api = api_with(transport);

        let source = aggregate(&api, remote::MATCH_ID, &options()).await.unwrap();

        let roster = &source.teams["faction1"].roster;
        assert_eq!(roster.len(), 5);
        assert!(roster[1].matches.is_empty());
        assert_eq!(roster[0].matches.len(), 20);
    }

    #[tokio::test]
    async fn test_unloadable_match_is_dropped() {
        let transport = Arc::new(MockTransport::new());
        transport.route("/match/v2/match/h5", |_, _| MockReply::status(404));
        scenario::install(&transport);
        let api = api_with(transport);

        let source = aggregate(&api, remote::MATCH_ID, &options()).await.unwrap();

        for entry in source.teams.values().flat_map(|t| t.roster.iter()) {
            assert_eq!(entry.matches.len(), 19);
            assert!(entry.matches.iter().all(|m| m.match_id != "h5"));
        }
    }

    #[tokio::test]
    async fn test_missing_stats_and_vetos_degrade() {
        let transport = Arc::new(MockTransport::new());
        transport.route("/matches/", |_, _| MockReply::status(503));
        transport.route("/democracy/", |_, _| MockReply::transport_error());
        scenario::install(&transport);
        let api = api_with(transport);

        let source = aggregate(&api, remote::MATCH_ID, &options()).await.unwrap();

        let record = &source.teams["faction1"].roster[0].matches[0];
        assert!(record.stats.is_none());
        assert!(record.vetos.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_match_aborts() {
        let transport = Arc::new(MockTransport::new());
        transport.route("/match/v2/match/1-abc", |_, _| MockReply::status(404));
        scenario::install(&transport);
        let api = api_with(transport.clone());

        assert!(aggregate(&api, remote::MATCH_ID, &options()).await.is_none());
        assert_eq!(transport.calls_matching("/players/"), 0);
    }

    #[tokio::test]
    async fn test_compute_reduces() {
        let transport = Arc::new(MockTransport::new());
        scenario::install(&transport);
        let api = api_with(transport);

        let metrics = compute(&api, remote::MATCH_ID, &options()).await.unwrap();

        let alice = metrics.player("id-alice").unwrap();
        assert_eq!(alice.matches, 20);
        assert_eq!(alice.wins, 20);
        assert_eq!(alice.kd_ratio, 2.0);
        assert_eq!(metrics.teams["faction1"].matches, 20);
        assert_eq!(metrics.teams["faction2"].players[0].wins, 0);
    }
}

//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::fetch::{
    FetchError, FetcherConfig, HttpResponse, HttpTransport, ManualClock, RemoteClient, RetryPolicy,
    StaticToken,
};
use crate::storage::{OptionStorage, StorageChange, StorageError};

type Handler = Arc<dyn Fn(&Url, usize) -> MockReply + Send + Sync>;

/// Scripted reply for one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response {
        status: u16,
        body: Vec<u8>,
        delay: Option<Duration>,
    },
    TransportError,
}

impl MockReply {
    pub fn json(body: Value) -> Self {
        MockReply::Response {
            status: 200,
            body: serde_json::to_vec(&body).unwrap(),
            delay: None,
        }
    }

    /// Successful web-endpoint envelope around `payload`.
    pub fn envelope(payload: Value) -> Self {
        Self::json(json!({ "code": "OPERATION-OK", "result": "OK", "payload": payload }))
    }

    pub fn status(status: u16) -> Self {
        MockReply::Response {
            status,
            body: b"{}".to_vec(),
            delay: None,
        }
    }

    pub fn transport_error() -> Self {
        MockReply::TransportError
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        match self {
            MockReply::Response { status, body, .. } => MockReply::Response {
                status,
                body,
                delay: Some(delay),
            },
            other => other,
        }
    }
}

struct Route {
    pattern: String,
    handler: Handler,
}

/// Transport that answers from registered routes. The first route whose
/// pattern occurs in the URL path wins; unmatched requests get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    hits: Mutex<HashMap<String, usize>>,
    bearers: Mutex<Vec<Option<String>>>,
    urls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(&self, pattern: &str, handler: F)
    where
        F: Fn(&Url, usize) -> MockReply + Send + Sync + 'static,
    {
        self.routes.lock().unwrap().push(Route {
            pattern: pattern.to_string(),
            handler: Arc::new(handler),
        });
    }

    /// Number of requests whose path contained `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.urls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(pattern))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &Url, bearer: Option<&str>) -> Result<HttpResponse, FetchError> {
        self.urls.lock().unwrap().push(url.path().to_string());
        self.bearers.lock().unwrap().push(bearer.map(str::to_string));

        let reply = {
            let routes = self.routes.lock().unwrap();
            match routes.iter().find(|r| url.path().contains(&r.pattern)) {
                Some(route) => {
                    let mut hits = self.hits.lock().unwrap();
                    let call = hits.entry(route.pattern.clone()).or_insert(0);
                    let reply = (route.handler)(url, *call);
                    *call += 1;
                    reply
                }
                None => MockReply::status(404),
            }
        };

        match reply {
            MockReply::Response {
                status,
                body,
                delay,
            } => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(HttpResponse { status, body })
            }
            MockReply::TransportError => Err(FetchError::Transport("connection reset".to_string())),
        }
    }
}

/// Client over `transport` with a single attempt per request.
pub fn client_with(transport: Arc<MockTransport>, clock: Arc<ManualClock>) -> RemoteClient {
    let config = FetcherConfig {
        web_base_url: "https://web.test".to_string(),
        open_base_url: "https://open.test".to_string(),
        retry: RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    RemoteClient::new(config, transport, Arc::new(StaticToken::default()), clock)
}

/// Storage whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStorage;

#[async_trait]
impl OptionStorage for FailingStorage {
    async fn get_many(&self, _keys: &[String]) -> Result<HashMap<String, Value>, StorageError> {
        Err(StorageError::Backend("quota exceeded".to_string()))
    }

    async fn set_many_from(
        &self,
        _entries: Vec<(String, Value)>,
        _origin: Option<uuid::Uuid>,
    ) -> Result<(), StorageError> {
        Err(StorageError::Backend("quota exceeded".to_string()))
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StorageChange> {
        tokio::sync::broadcast::channel(1).1
    }
}

/// Lobby page fixtures.
pub mod fixtures {
    /// Player card with the nickname three levels down.
    fn card(name: &str) -> String {
        format!(
            r#"<div class="card"><div><div><span>{}</span></div></div></div>"#,
            name
        )
    }

    /// Player card from the newer layout: avatar first, nickname one level
    /// down inside the second child.
    fn card_with_avatar(name: &str) -> String {
        format!(
            r#"<div class="card"><img src="a.png"><div><span>{}</span></div></div>"#,
            name
        )
    }

    fn column(slot: &str, team_name: &str, roster_html: &str) -> String {
        format!(
            r#"<div name="{}"><div class="team-header"><h2>{}</h2></div><div class="roster">{}</div></div>"#,
            slot, team_name, roster_html
        )
    }

    /// Flat roster: five cards directly under the roster list.
    pub fn flat_roster(names: &[&str]) -> String {
        names.iter().map(|n| card(n)).collect()
    }

    /// Grouped roster: premade groups of cards.
    pub fn grouped_roster(groups: &[&[&str]]) -> String {
        groups
            .iter()
            .map(|group| {
                let cards: String = group.iter().map(|n| card_with_avatar(n)).collect();
                format!(r#"<div class="party">{}</div>"#, cards)
            })
            .collect()
    }

    /// Map list shown while voting.
    pub fn voting_info(map_names: &[&str]) -> String {
        let rows: String = map_names
            .iter()
            .map(|n| format!(r#"<div class="map-row"><img src="m.png"><span>{}</span></div>"#, n))
            .collect();
        format!(
            r#"<div class="status">Voting</div><div class="maps"><div class="list">{}</div></div>"#,
            rows
        )
    }

    /// Single chosen map, reachable via the primary lookup chain.
    pub fn picked_info(map_name: &str) -> String {
        format!(
            r#"<div class="picked"><div><img src="m.png"><span>{}</span></div></div>"#,
            map_name
        )
    }

    /// Single chosen map, reachable only via the fallback lookup chain.
    pub fn picked_info_fallback(map_name: &str) -> String {
        format!(
            r#"<div class="picked"><img src="m.png"><span>{}</span></div>"#,
            map_name
        )
    }

    pub fn page(left_roster: &str, info: &str, right_roster: &str) -> String {
        format!(
            r#"<html><head><title>Room</title></head><body><div id="MATCHROOM-OVERVIEW">{}<div name="info">{}</div>{}</div></body></html>"#,
            column("roster1", "Team Alpha", left_roster),
            info,
            column("roster2", "Team Bravo", right_roster)
        )
    }

    pub const LEFT: [&str; 5] = ["Alice", "Bob", "Carol", "Dave", "Eve"];
    pub const RIGHT: [&str; 5] = ["Frank", "Grace", "Heidi", "Ivan", "Judy"];

    /// Standard voting-phase page with two flat rosters.
    pub fn voting_page() -> String {
        page(
            &flat_roster(&LEFT),
            &voting_info(&["Mirage", "Inferno", "Nuke"]),
            &flat_roster(&RIGHT),
        )
    }
}

/// Remote-service fixtures consistent with [`fixtures`].
pub mod remote {
    use serde_json::{json, Value};

    use super::fixtures::{LEFT, RIGHT};

    pub const MATCH_ID: &str = "1-abc";

    pub fn map_entities() -> Value {
        json!([
            { "guid": "de_mirage", "name": "Mirage" },
            { "guid": "de_inferno", "name": "Inferno" },
            { "guid": "de_nuke", "name": "Nuke" },
            { "guid": "de_ancient", "name": "Ancient" }
        ])
    }

    fn roster(names: &[&str]) -> Value {
        Value::Array(
            names
                .iter()
                .map(|n| json!({ "id": format!("id-{}", n.to_lowercase()), "nickname": n }))
                .collect(),
        )
    }

    /// Match details payload for the lobby.
    pub fn lobby_match(status: &str) -> Value {
        json!({
            "id": MATCH_ID,
            "status": status,
            "teams": {
                "faction1": { "name": "Team Alpha", "leader": "id-alice", "roster": roster(&LEFT) },
                "faction2": { "name": "Team Bravo", "leader": "id-frank", "roster": roster(&RIGHT) }
            },
            "voting": { "map": { "entities": map_entities(), "pick": ["de_mirage"] } }
        })
    }

    /// Finished historical match between the two lobby rosters, won by
    /// faction1 on `map`.
    pub fn finished_match(match_id: &str, map: &str) -> Value {
        json!({
            "id": match_id,
            "status": "FINISHED",
            "teams": {
                "faction1": { "name": "Team Alpha", "leader": "id-alice", "roster": roster(&LEFT) },
                "faction2": { "name": "Team Bravo", "leader": "id-frank", "roster": roster(&RIGHT) }
            },
            "voting": { "map": { "entities": map_entities(), "pick": [map] } },
            "results": { "winner": "faction1" }
        })
    }

    /// Ids of every player in [`lobby_match`].
    pub fn all_player_ids() -> Vec<String> {
        LEFT.iter()
            .chain(RIGHT.iter())
            .map(|n| format!("id-{}", n.to_lowercase()))
            .collect()
    }

    pub fn stats_for<S: AsRef<str>>(player_ids: &[S], kills: u32, deaths: u32) -> Value {
        let players: Vec<Value> = player_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                json!({
                    "player_id": id,
                    "nickname": id,
                    "player_stats": {
                        "Kills": kills.to_string(),
                        "Deaths": deaths.to_string(),
                        "Headshots": (kills / 2).to_string()
                    }
                })
            })
            .collect();
        json!({
            "rounds": [{
                "round_stats": { "Map": "de_mirage", "Rounds": "24" },
                "teams": [{ "team_id": "faction1", "players": players }]
            }]
        })
    }

    pub fn vetos(faction: &str) -> Value {
        json!({
            "tickets": [{
                "entity_type": "map",
                "entities": [
                    { "guid": "de_nuke", "status": "drop", "random": false, "round": 1, "selected_by": faction },
                    { "guid": "de_ancient", "status": "drop", "random": true, "round": 2, "selected_by": faction },
                    { "guid": "de_inferno", "status": "drop", "random": false, "round": 3, "selected_by": "other" },
                    { "guid": "de_mirage", "status": "pick", "random": false, "round": 4, "selected_by": faction }
                ]
            }]
        })
    }
}

/// A healthy remote service for the lobby in [`fixtures`].
pub mod scenario {
    use serde_json::{json, Value};
    use url::Url;

    use super::{remote, MockReply, MockTransport};

    /// History items served per player, three days apart.
    pub const HISTORY_LEN: i64 = 40;
    pub const HISTORY_STEP_SECS: i64 = 3 * 86_400;

    pub const MAPS: [&str; 3] = ["de_mirage", "de_inferno", "de_nuke"];

    fn last_segment(url: &Url, from_end: usize) -> String {
        url.path()
            .trim_end_matches('/')
            .rsplit('/')
            .nth(from_end)
            .unwrap_or_default()
            .to_string()
    }

    fn query_i64(url: &Url, key: &str) -> i64 {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0)
    }

    /// History ids are `h<index>`, shared by every player. The service
    /// ignores the window so the client has to apply it.
    pub fn history(url: &Url) -> Value {
        let to = query_i64(url, "to");
        let items: Vec<Value> = (0..HISTORY_LEN)
            .map(|i| json!({ "match_id": format!("h{}", i), "started_at": to - i * HISTORY_STEP_SECS }))
            .collect();
        json!({ "items": items })
    }

    pub fn match_details(url: &Url) -> Value {
        let id = last_segment(url, 0);
        if id == remote::MATCH_ID {
            return remote::lobby_match("VOTING");
        }
        let index: usize = id.trim_start_matches('h').parse().unwrap_or(0);
        remote::finished_match(&id, MAPS[index % MAPS.len()])
    }

    pub fn install(transport: &MockTransport) {
        transport.route("/match/v2/match/", |url, _| MockReply::envelope(match_details(url)));
        transport.route("/players/", |url, _| MockReply::json(history(url)));
        transport.route("/matches/", |_, _| {
            MockReply::json(remote::stats_for(&remote::all_player_ids(), 20, 10))
        });
        transport.route("/democracy/v1/match/", |_, _| {
            MockReply::envelope(remote::vetos("faction1"))
        });
    }
}

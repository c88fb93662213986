//! Overlay features bound to lobby containers.

use std::sync::Arc;

use super::component::SubComponent;
use super::host::{HostError, InsertPosition, OverlayHost};
use super::Feature;
use crate::models::{LobbyMap, MapMetrics, MetricsAggregate, Player, PlayerMetrics, Team};

/// Per-map team tendencies, one badge per map container.
pub struct MapFeature {
    key: String,
    maps: Vec<LobbyMap>,
    teams: [Team; 2],
    components: Vec<SubComponent>,
}

impl MapFeature {
    pub fn new(key: impl Into<String>, host: Arc<dyn OverlayHost>, maps: Vec<LobbyMap>, teams: [Team; 2]) -> Self {
        let components = maps
            .iter()
            .map(|map| {
                SubComponent::new(
                    format!("map:{}", map.id),
                    host.clone(),
                    map.container.clone(),
                    InsertPosition::Append,
                )
            })
            .collect();
        Self {
            key: key.into(),
            maps,
            teams,
            components,
        }
    }

    fn html(&self, map: &LobbyMap, metrics: Option<&MetricsAggregate>) -> String {
        let Some(metrics) = metrics else {
            return loading("mrl-map-stats");
        };
        let rows: String = self
            .teams
            .iter()
            .map(|team| {
                let stats = metrics
                    .teams
                    .get(&team.id)
                    .and_then(|t| t.maps.get(&map.id))
                    .cloned()
                    .unwrap_or_default();
                map_row(&team.name, &stats)
            })
            .collect();
        format!(r#"<div class="mrl-map-stats" data-map="{}">{}</div>"#, escape(&map.id), rows)
    }
}

impl Feature for MapFeature {
    fn key(&self) -> &str {
        &self.key
    }

    fn is_attached(&self) -> bool {
        self.components.iter().all(SubComponent::is_attached)
    }

    fn render(&mut self, metrics: Option<&MetricsAggregate>) -> Result<(), HostError> {
        let html: Vec<String> = self.maps.iter().map(|m| self.html(m, metrics)).collect();
        for (component, html) in self.components.iter_mut().zip(html) {
            component.render(&html)?;
        }
        Ok(())
    }

    fn unmount(&mut self) {
        self.components.iter_mut().for_each(SubComponent::unmount);
    }
}

/// Per-player summary appended to each player card.
pub struct PlayerFeature {
    key: String,
    players: Vec<Player>,
    components: Vec<SubComponent>,
}

impl PlayerFeature {
    pub fn new(key: impl Into<String>, host: Arc<dyn OverlayHost>, players: Vec<Player>) -> Self {
        let components = players
            .iter()
            .map(|player| {
                SubComponent::new(
                    format!("player:{}", player.id),
                    host.clone(),
                    player.container.clone(),
                    InsertPosition::Append,
                )
            })
            .collect();
        Self {
            key: key.into(),
            players,
            components,
        }
    }
}

impl Feature for PlayerFeature {
    fn key(&self) -> &str {
        &self.key
    }

    fn is_attached(&self) -> bool {
        self.components.iter().all(SubComponent::is_attached)
    }

    fn render(&mut self, metrics: Option<&MetricsAggregate>) -> Result<(), HostError> {
        for (player, component) in self.players.iter().zip(self.components.iter_mut()) {
            let html = match metrics {
                None => loading("mrl-player-stats"),
                Some(metrics) => match metrics.player_by_name(&player.name) {
                    Some(stats) => player_html(stats),
                    None => r#"<div class="mrl-player-stats mrl-empty">No data</div>"#.to_string(),
                },
            };
            component.render(&html)?;
        }
        Ok(())
    }

    fn unmount(&mut self) {
        self.components.iter_mut().for_each(SubComponent::unmount);
    }
}

fn loading(class: &str) -> String {
    format!(r#"<div class="{} mrl-loading">Loading</div>"#, class)
}

fn percent(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}

fn map_row(team_name: &str, stats: &MapMetrics) -> String {
    format!(
        r#"<div class="mrl-map-team"><span class="mrl-team">{}</span> <span>{} played</span> <span>{} won</span> <span>{} picked</span> <span>{} dropped</span></div>"#,
        escape(team_name),
        stats.matches,
        percent(stats.win_rate),
        percent(stats.pick_rate),
        percent(stats.drop_rate)
    )
}

fn player_html(stats: &PlayerMetrics) -> String {
    format!(
        r#"<div class="mrl-player-stats"><span>{} matches</span> <span>{} WR</span> <span>{:.2} K/D</span> <span>{:.2} K/R</span> <span>{} HS</span></div>"#,
        stats.matches,
        percent(stats.win_rate),
        stats.kd_ratio,
        stats.kr_ratio,
        percent(stats.headshot_rate)
    )
}

/// Escape text for element content and quoted attribute values.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

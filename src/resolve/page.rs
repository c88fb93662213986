//! Owned snapshot of the host document.

use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};

/// The host page as last observed: its URL and serialized DOM.
///
/// Parsing happens on demand and the parsed tree never outlives the call
/// that needs it, so nothing here ties the caller to a single thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPage {
    pub url: String,
    pub html: String,
}

impl HostPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Lobby id from a `/room/<id>/` style URL.
    pub fn lobby_id(&self) -> Option<String> {
        lobby_id_from_url(&self.url)
    }
}

pub fn lobby_id_from_url(url: &str) -> Option<String> {
    let re = Regex::new(r"/room/([^/?#]+)(?:[/?#]|$)").unwrap();
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_id_from_url() {
        assert_eq!(
            lobby_id_from_url("https://www.faceit.com/en/cs2/room/1-abc-def/scoreboard"),
            Some("1-abc-def".to_string())
        );
        assert_eq!(
            lobby_id_from_url("https://www.faceit.com/en/cs2/room/1-abc"),
            Some("1-abc".to_string())
        );
        assert_eq!(
            lobby_id_from_url("https://www.faceit.com/en/cs2/room/1-abc?tab=info"),
            Some("1-abc".to_string())
        );
        assert_eq!(lobby_id_from_url("https://www.faceit.com/en/home"), None);
        assert_eq!(lobby_id_from_url("https://www.faceit.com/en/cs2/room/"), None);
    }
}

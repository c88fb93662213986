//! Structural reading of the lobby DOM.
//!
//! Every assumption about nesting depth and child counts lives here. The
//! rest of the crate only sees [`PageLayout`] and the snapshot built from it.

use scraper::{ElementRef, Html, Selector};

use crate::models::NodePath;

const ROOT_SELECTOR: &str = "#MATCHROOM-OVERVIEW";
const ROSTER_SLOTS: [&str; 2] = ["roster1", "roster2"];

/// A flat roster has exactly this many direct children, one per player.
pub const FLAT_ROSTER_SIZE: usize = 5;

/// Column child holding the team header / the roster list.
const TEAM_HEADER_INDEX: usize = 0;
const ROSTER_LIST_INDEX: usize = 1;

/// Where a nickname may sit inside a player card, tried in order.
const NAME_PATHS: [&[usize]; 2] = [&[0, 0, 0], &[1, 0]];

/// Voting list, relative to the info column.
const VOTING_LIST_PATH: &[usize] = &[1, 0];
/// Map name inside a voting row.
const VOTING_ROW_NAME_PATH: &[usize] = &[1];
/// Chosen map name, relative to the info column, tried in order.
const ACTIVE_MAP_PATHS: [&[usize]; 2] = [&[0, 0, 1], &[0, 1]];

/// Shape detected for a roster list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterShape {
    Flat,
    Grouped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedNode {
    pub name: String,
    pub path: NodePath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterLayout {
    pub header: NodePath,
    pub header_text: String,
    pub shape: RosterShape,
    pub players: Vec<NamedNode>,
}

/// Everything the DOM alone can tell us about the lobby.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub rosters: [RosterLayout; 2],
    /// Map rows shown while voting
    pub voting_maps: Vec<NamedNode>,
    /// The single chosen map shown once voting is over
    pub active_map: Option<NamedNode>,
}

/// Read the lobby layout. `None` means the lobby is not rendered yet.
pub fn read_layout(document: &Html) -> Option<PageLayout> {
    let root_sel = Selector::parse(ROOT_SELECTOR).unwrap();
    let root = document.select(&root_sel).next()?;

    let left = read_roster(root, ROSTER_SLOTS[0])?;
    let right = read_roster(root, ROSTER_SLOTS[1])?;

    let info_sel = Selector::parse(r#"[name="info"]"#).unwrap();
    let info = root.select(&info_sel).next();

    let voting_maps = info.map(read_voting_maps).unwrap_or_default();
    let active_map = info.and_then(read_active_map);

    Some(PageLayout {
        rosters: [left, right],
        voting_maps,
        active_map,
    })
}

fn read_roster(root: ElementRef<'_>, slot: &str) -> Option<RosterLayout> {
    let column_sel = Selector::parse(&format!(r#"[name="{}"]"#, slot)).unwrap();
    let column = root.select(&column_sel).next()?;
    let header = child_element(column, TEAM_HEADER_INDEX)?;
    let list = child_element(column, ROSTER_LIST_INDEX)?;

    let shape = roster_shape(list);
    let cards: Vec<ElementRef<'_>> = match shape {
        RosterShape::Flat => child_elements(list).collect(),
        RosterShape::Grouped => child_elements(list).flat_map(child_elements).collect(),
    };

    let players = cards
        .into_iter()
        .filter_map(|card| {
            player_name(card).map(|name| NamedNode {
                name,
                path: NodePath::of(card),
            })
        })
        .collect();

    Some(RosterLayout {
        header: NodePath::of(header),
        header_text: text_of(header),
        shape,
        players,
    })
}

/// Flat when there are exactly five children and each one carries a
/// nickname itself; anything else is walked as premade groups.
pub fn roster_shape(list: ElementRef<'_>) -> RosterShape {
    let children: Vec<ElementRef<'_>> = child_elements(list).collect();
    if children.len() == FLAT_ROSTER_SIZE && children.iter().all(|c| player_name(*c).is_some()) {
        RosterShape::Flat
    } else {
        RosterShape::Grouped
    }
}

fn player_name(card: ElementRef<'_>) -> Option<String> {
    NAME_PATHS
        .iter()
        .filter_map(|path| descend(card, path))
        .map(text_of)
        .find(|name| !name.is_empty())
}

fn read_voting_maps(info: ElementRef<'_>) -> Vec<NamedNode> {
    let Some(list) = descend(info, VOTING_LIST_PATH) else {
        return Vec::new();
    };

    child_elements(list)
        .filter_map(|row| {
            let name = descend(row, VOTING_ROW_NAME_PATH)
                .map(text_of)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| text_of(row));
            if name.is_empty() {
                return None;
            }
            Some(NamedNode {
                name,
                path: NodePath::of(row),
            })
        })
        .collect()
}

fn read_active_map(info: ElementRef<'_>) -> Option<NamedNode> {
    ACTIVE_MAP_PATHS.iter().find_map(|path| {
        let node = descend(info, path)?;
        let name = text_of(node);
        if name.is_empty() {
            return None;
        }
        let container = node.parent().and_then(ElementRef::wrap).unwrap_or(node);
        Some(NamedNode {
            name,
            path: NodePath::of(container),
        })
    })
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element.children().filter_map(ElementRef::wrap)
}

fn child_element(element: ElementRef<'_>, index: usize) -> Option<ElementRef<'_>> {
    child_elements(element).nth(index)
}

/// Follow element-child indices down from `element`.
fn descend<'a>(element: ElementRef<'a>, path: &[usize]) -> Option<ElementRef<'a>> {
    path.iter()
        .try_fold(element, |current, &index| child_element(current, index))
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_not_ready_without_root() {
        let html = Html::parse_document("<html><body><div>loading</div></body></html>");
        assert!(read_layout(&html).is_none());
    }

    #[test]
    fn test_not_ready_with_one_roster() {
        let html = Html::parse_document(
            r#"<html><body><div id="MATCHROOM-OVERVIEW"><div name="roster1"><div></div><div></div></div></div></body></html>"#,
        );
        assert!(read_layout(&html).is_none());
    }

    #[test]
    fn test_flat_rosters() {
        let html = Html::parse_document(&fixtures::voting_page());
        let layout = read_layout(&html).unwrap();

        assert_eq!(layout.rosters[0].shape, RosterShape::Flat);
        assert_eq!(layout.rosters[0].header_text, "Team Alpha");
        let names: Vec<&str> = layout.rosters[0]
            .players
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, fixtures::LEFT.to_vec());
        assert_eq!(layout.rosters[1].players.len(), 5);
    }

    #[test]
    fn test_grouped_roster_with_alternate_name_location() {
        let page = fixtures::page(
            &fixtures::flat_roster(&fixtures::LEFT),
            &fixtures::voting_info(&["Mirage"]),
            &fixtures::grouped_roster(&[&["Frank", "Grace"], &["Heidi", "Ivan", "Judy"]]),
        );
        let html = Html::parse_document(&page);
        let layout = read_layout(&html).unwrap();

        assert_eq!(layout.rosters[1].shape, RosterShape::Grouped);
        let names: Vec<&str> = layout.rosters[1]
            .players
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, fixtures::RIGHT.to_vec());

        // Paths lead back to the cards
        let card = layout.rosters[1].players[2].path.locate(&html).unwrap();
        assert_eq!(card.value().attr("class"), Some("card"));
    }

    #[test]
    fn test_voting_maps() {
        let html = Html::parse_document(&fixtures::voting_page());
        let layout = read_layout(&html).unwrap();

        let names: Vec<&str> = layout.voting_maps.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Mirage", "Inferno", "Nuke"]);
    }

    #[test]
    fn test_active_map_primary_and_fallback_chain() {
        let primary = Html::parse_document(&fixtures::page(
            &fixtures::flat_roster(&fixtures::LEFT),
            &fixtures::picked_info("Inferno"),
            &fixtures::flat_roster(&fixtures::RIGHT),
        ));
        let fallback = Html::parse_document(&fixtures::page(
            &fixtures::flat_roster(&fixtures::LEFT),
            &fixtures::picked_info_fallback("Nuke"),
            &fixtures::flat_roster(&fixtures::RIGHT),
        ));

        assert_eq!(
            read_layout(&primary).unwrap().active_map.map(|m| m.name),
            Some("Inferno".to_string())
        );
        assert_eq!(
            read_layout(&fallback).unwrap().active_map.map(|m| m.name),
            Some("Nuke".to_string())
        );
    }
}

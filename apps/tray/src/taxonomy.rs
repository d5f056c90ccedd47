//! Exit node taxonomy: turns the daemon's peer list into the exit node menu plan.
//!
//! Everything here is pure. Location-tagged peers are grouped by country code and
//! city code; each group elects a best peer by priority, with ties going to the
//! smallest node id so the election never depends on input order.

use std::collections::BTreeMap;

use shared::{
    domain::{StableNodeId, CAP_LOCATION_EXIT_NODES, CAP_SUGGEST_EXIT_NODE_UI},
    protocol::{ExitNodeSuggestion, PeerStatus, Status},
};

pub const NONE_TITLE: &str = "None";
pub const BEST_AVAILABLE_TITLE: &str = "Best Available";
pub const TAILNET_HEADER: &str = "Tailnet Exit Nodes";
pub const LOCATION_HEADER: &str = "Location-based Exit Nodes";
pub const LOCATION_PROVIDER_TITLE: &str = "Mullvad VPN";

/// What selecting an exit node entry asks the daemon to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitNodeTarget {
    Clear,
    Node(StableNodeId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub suggest_exit_node: bool,
    pub location_exit_nodes: bool,
}

impl Capabilities {
    pub fn of(status: &Status) -> Self {
        Self {
            suggest_exit_node: status.self_has_capability(CAP_SUGGEST_EXIT_NODE_UI),
            location_exit_nodes: status.self_has_capability(CAP_LOCATION_EXIT_NODES),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toggle {
    pub title: String,
    pub target: ExitNodeTarget,
    pub checked: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submenu {
    pub title: String,
    pub checked: bool,
    pub entries: Vec<PlanEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanEntry {
    Separator,
    /// Disabled label introducing a section.
    Header(String),
    Toggle(Toggle),
    Submenu(Submenu),
}

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub code: String,
    pub name: String,
    pub peers: Vec<PeerStatus>,
    pub best: PeerStatus,
}

impl City {
    pub fn contains(&self, id: &StableNodeId) -> bool {
        self.peers.iter().any(|peer| &peer.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub cities: BTreeMap<String, City>,
    pub best: PeerStatus,
}

impl Country {
    pub fn contains(&self, id: &StableNodeId) -> bool {
        self.cities.values().any(|city| city.contains(id))
    }

    /// Cities sorted by display name, then code.
    pub fn sorted_cities(&self) -> Vec<&City> {
        let mut cities: Vec<&City> = self.cities.values().collect();
        cities.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.code.cmp(&b.code)));
        cities
    }
}

/// Location-tagged exit node candidates keyed by country code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationGroups {
    pub countries: BTreeMap<String, Country>,
}

impl LocationGroups {
    pub fn from_peers(peers: &[PeerStatus]) -> Self {
        let mut countries: BTreeMap<String, Country> = BTreeMap::new();
        for peer in peers {
            if !peer.exit_node_option {
                continue;
            }
            let Some(loc) = &peer.location else {
                continue;
            };

            let country = countries
                .entry(loc.country_code.clone())
                .or_insert_with(|| Country {
                    code: loc.country_code.clone(),
                    name: loc.country.clone(),
                    cities: BTreeMap::new(),
                    best: peer.clone(),
                });
            if outranks(peer, &country.best) {
                country.best = peer.clone();
            }

            match country.cities.get_mut(&loc.city_code) {
                Some(city) => {
                    city.peers.push(peer.clone());
                    if outranks(peer, &city.best) {
                        city.best = peer.clone();
                    }
                }
                None => {
                    country.cities.insert(
                        loc.city_code.clone(),
                        City {
                            code: loc.city_code.clone(),
                            name: loc.city.clone(),
                            peers: vec![peer.clone()],
                            best: peer.clone(),
                        },
                    );
                }
            }
        }
        Self { countries }
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    /// Countries sorted by display name, then code.
    pub fn sorted_countries(&self) -> Vec<&Country> {
        let mut countries: Vec<&Country> = self.countries.values().collect();
        countries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.code.cmp(&b.code)));
        countries
    }
}

fn priority(peer: &PeerStatus) -> i64 {
    peer.location.as_ref().map_or(0, |loc| loc.priority)
}

/// Higher priority wins; equal priority goes to the smaller node id.
fn outranks(candidate: &PeerStatus, incumbent: &PeerStatus) -> bool {
    let (candidate_priority, incumbent_priority) = (priority(candidate), priority(incumbent));
    candidate_priority > incumbent_priority
        || (candidate_priority == incumbent_priority && candidate.id < incumbent.id)
}

/// Emoji flag for a two letter country code, or "" if the code is not two ASCII letters.
pub fn country_flag(code: &str) -> String {
    let bytes = code.as_bytes();
    if bytes.len() != 2 {
        return String::new();
    }
    let mut flag = String::with_capacity(8);
    for byte in bytes {
        let lower = byte.to_ascii_lowercase();
        if !lower.is_ascii_lowercase() {
            return String::new();
        }
        // Regional indicator symbols start at U+1F1E6.
        match char::from_u32(0x1F1E6 + u32::from(lower - b'a')) {
            Some(ch) => flag.push(ch),
            None => return String::new(),
        }
    }
    flag
}

fn flagged(code: &str, name: &str) -> String {
    let flag = country_flag(code);
    if flag.is_empty() {
        name.to_string()
    } else {
        format!("{flag} {name}")
    }
}

fn recommended_title(suggestion: &ExitNodeSuggestion) -> String {
    match &suggestion.location {
        Some(loc) if !loc.country.is_empty() => format!(
            "Recommended: {}: {}",
            flagged(&loc.country_code, &loc.country),
            loc.city
        ),
        _ => format!(
            "Recommended: {}",
            suggestion.name.split('.').next().unwrap_or_default()
        ),
    }
}

/// Hands the active exit node's check mark to the first entry that claims it.
struct Selection<'a> {
    active: Option<&'a StableNodeId>,
    claimed: bool,
}

impl<'a> Selection<'a> {
    fn claim(&mut self, matches: impl FnOnce(&StableNodeId) -> bool) -> bool {
        if self.claimed {
            return false;
        }
        match self.active {
            Some(id) if matches(id) => {
                self.claimed = true;
                true
            }
            _ => false,
        }
    }
}

/// Builds the entries of the exit node submenu.
///
/// `suggestion` is only consulted when the local node advertises the
/// suggestion capability.
pub fn build_exit_node_plan(
    status: &Status,
    suggestion: Option<&ExitNodeSuggestion>,
) -> Vec<PlanEntry> {
    let caps = Capabilities::of(status);
    let mut selection = Selection {
        active: status.active_exit_node(),
        claimed: false,
    };
    let mut entries = vec![PlanEntry::Toggle(Toggle {
        title: NONE_TITLE.to_string(),
        target: ExitNodeTarget::Clear,
        checked: selection.active.is_none(),
        enabled: true,
    })];

    if let Some(suggestion) = suggestion.filter(|_| caps.suggest_exit_node) {
        entries.push(PlanEntry::Separator);
        entries.push(PlanEntry::Toggle(Toggle {
            title: recommended_title(suggestion),
            target: ExitNodeTarget::Node(suggestion.id.clone()),
            checked: selection.claim(|id| id == &suggestion.id),
            enabled: true,
        }));
    }

    let tailnet: Vec<&PeerStatus> = status
        .peer
        .iter()
        .filter(|peer| peer.exit_node_option && peer.location.is_none())
        .collect();
    if !tailnet.is_empty() {
        entries.push(PlanEntry::Separator);
        entries.push(PlanEntry::Header(TAILNET_HEADER.to_string()));
        for peer in tailnet {
            let mut title = peer.short_name().to_string();
            if !peer.online {
                title.push_str(" (offline)");
            }
            entries.push(PlanEntry::Toggle(Toggle {
                title,
                target: ExitNodeTarget::Node(peer.id.clone()),
                checked: selection.claim(|id| id == &peer.id),
                enabled: peer.online,
            }));
        }
    }

    if caps.location_exit_nodes {
        let groups = LocationGroups::from_peers(&status.peer);
        if !groups.is_empty() {
            entries.push(PlanEntry::Separator);
            entries.push(PlanEntry::Header(LOCATION_HEADER.to_string()));
            entries.push(PlanEntry::Submenu(location_submenu(&groups, &mut selection)));
        }
    }

    entries
}

fn location_submenu(groups: &LocationGroups, selection: &mut Selection<'_>) -> Submenu {
    let mut entries = Vec::with_capacity(groups.countries.len());
    for country in groups.sorted_countries() {
        let title = flagged(&country.code, &country.name);

        // Single-city countries render flat.
        if country.cities.len() == 1 {
            entries.push(PlanEntry::Toggle(Toggle {
                title,
                target: ExitNodeTarget::Node(country.best.id.clone()),
                checked: selection.claim(|id| country.contains(id)),
                enabled: true,
            }));
            continue;
        }

        let mut city_entries = vec![
            PlanEntry::Toggle(Toggle {
                title: BEST_AVAILABLE_TITLE.to_string(),
                target: ExitNodeTarget::Node(country.best.id.clone()),
                checked: false,
                enabled: true,
            }),
            PlanEntry::Separator,
        ];
        let mut country_checked = false;
        for city in country.sorted_cities() {
            let checked = selection.claim(|id| city.contains(id));
            country_checked |= checked;
            city_entries.push(PlanEntry::Toggle(Toggle {
                title: city.name.clone(),
                target: ExitNodeTarget::Node(city.best.id.clone()),
                checked,
                enabled: true,
            }));
        }
        entries.push(PlanEntry::Submenu(Submenu {
            title,
            checked: country_checked,
            entries: city_entries,
        }));
    }

    let checked = entries.iter().any(|entry| match entry {
        PlanEntry::Toggle(toggle) => toggle.checked,
        PlanEntry::Submenu(submenu) => submenu.checked,
        _ => false,
    });
    Submenu {
        title: LOCATION_PROVIDER_TITLE.to_string(),
        checked,
        entries,
    }
}

#[cfg(test)]
#[path = "tests/taxonomy_tests.rs"]
mod tests;

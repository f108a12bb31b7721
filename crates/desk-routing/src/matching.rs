//! Narrows a support-group catalog to the groups worth showing for one ticket:
//! branches at the ticket's (or the affected user's) site, and global groups
//! whose keywords appear in the ticket text.

use std::collections::HashMap;

use desk_core::{CanonicalTicket, SupportGroupEntry};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::{CatalogPartition, partition_by_location};

/// Placeholder location used for tickets raised by remote staff.
const REMOTE_USER: &str = "Remote User";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SiteDirectory {
    #[serde(default)]
    pub locations: Vec<SiteCategory>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SiteCategory {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sites: Vec<Site>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Site {
    #[serde(default)]
    pub name: String,
}

impl SiteDirectory {
    fn named(&self) -> impl Iterator<Item = &SiteCategory> {
        self.locations
            .iter()
            .filter(|location| !location.category.trim().is_empty())
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.named().map(|location| location.category.as_str())
    }

    /// Category owning a site with exactly this name.
    pub fn category_of_site(&self, site_name: &str) -> Option<&str> {
        self.named()
            .find(|location| location.sites.iter().any(|site| site.name == site_name))
            .map(|location| location.category.as_str())
    }

    /// A company matches its own category name or any site name containing it.
    pub fn category_for_company(&self, company: &str) -> Option<&str> {
        let company = company.to_lowercase();
        self.named()
            .find(|location| {
                location.category.to_lowercase() == company
                    || location
                        .sites
                        .iter()
                        .any(|site| site.name.to_lowercase().contains(&company))
            })
            .map(|location| location.category.as_str())
    }

    pub fn category_for_address(&self, address: &str) -> Option<&str> {
        let address = address.to_lowercase();
        self.named()
            .find(|location| {
                location
                    .sites
                    .iter()
                    .any(|site| site.name.to_lowercase().contains(&address))
            })
            .map(|location| location.category.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupKeywords {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Keywords per support group name, read from the keyword snapshot.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(from = "Vec<GroupKeywords>")]
pub struct KeywordIndex {
    by_group: HashMap<String, Vec<String>>,
}

impl From<Vec<GroupKeywords>> for KeywordIndex {
    fn from(entries: Vec<GroupKeywords>) -> Self {
        let by_group = entries
            .into_iter()
            .map(|entry| {
                let keywords = entry
                    .keywords
                    .into_iter()
                    .map(|keyword| keyword.trim().to_lowercase())
                    .filter(|keyword| !keyword.is_empty())
                    .collect();
                (entry.name, keywords)
            })
            .collect();
        Self { by_group }
    }
}

impl KeywordIndex {
    /// Groups without keywords never match.
    pub fn matches(&self, group: &str, content: &str) -> bool {
        let content = content.to_lowercase();
        self.by_group
            .get(group)
            .is_some_and(|keywords| keywords.iter().any(|keyword| content.contains(keyword)))
    }
}

/// Optional routing snapshots that accompany a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingHints {
    pub sites: SiteDirectory,
    /// `None` leaves global groups unfiltered.
    pub keywords: Option<KeywordIndex>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationMatch {
    pub user_location: Option<String>,
    pub incident_location: Option<String>,
}

impl LocationMatch {
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.user_location
            .iter()
            .chain(self.incident_location.iter())
            .map(String::as_str)
    }
}

/// Site category of the incident location and of the affected user.
pub fn match_locations(ticket: &CanonicalTicket, sites: &SiteDirectory) -> LocationMatch {
    let incident_location = incident_site(ticket)
        .filter(|site| site != REMOTE_USER)
        .and_then(|site| sites.category_of_site(&site))
        .map(str::to_string);

    let user = affected_user(ticket);
    let user_location = user
        .and_then(|user| non_empty(user, "company"))
        .and_then(|company| sites.category_for_company(company))
        .or_else(|| {
            user.and_then(|user| non_empty(user, "streetAddress"))
                .and_then(|address| sites.category_for_address(address))
        })
        .map(str::to_string);

    LocationMatch {
        user_location,
        incident_location,
    }
}

/// Location-specific groups plus the global groups that fit the ticket.
///
/// Starts from `partition_by_location`, then moves groups named after a
/// matched site category into the location section. Global groups named
/// after any known site category, or containing one of `exclude_keywords`,
/// are dropped; with a keyword index only groups whose keywords occur in the
/// ticket text stay.
pub fn match_support_groups(
    entries: &[SupportGroupEntry],
    ticket: &CanonicalTicket,
    hints: &RoutingHints,
    exclude_keywords: &[String],
) -> CatalogPartition {
    let location_text = ticket.location.as_deref().unwrap_or_default();
    let CatalogPartition {
        mut location_specific,
        global: remaining,
    } = partition_by_location(entries, location_text);

    let matched: Vec<String> = match_locations(ticket, &hints.sites)
        .categories()
        .map(str::to_lowercase)
        .collect();
    let site_categories: Vec<String> = hints.sites.categories().map(str::to_lowercase).collect();
    let excluded: Vec<String> = exclude_keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect();
    let content = ticket_content(ticket);

    let mut global = Vec::new();
    for entry in remaining {
        let name = entry.name.to_lowercase();
        if matched.iter().any(|category| name.contains(category.as_str())) {
            location_specific.push(entry);
        } else if site_categories.iter().any(|category| name.contains(category.as_str()))
            || excluded.iter().any(|keyword| name.contains(keyword.as_str()))
        {
            continue;
        } else if hints
            .keywords
            .as_ref()
            .is_none_or(|index| index.matches(&entry.name, &content))
        {
            global.push(entry);
        }
    }

    debug!(
        location_specific = location_specific.len(),
        global = global.len(),
        "matched support groups"
    );
    CatalogPartition {
        location_specific,
        global,
    }
}

/// Ticket text searched for group keywords.
pub fn ticket_content(ticket: &CanonicalTicket) -> String {
    let display_name = ticket.extra.get("display_name").and_then(Value::as_str);
    let user_title = affected_user(ticket).and_then(|user| non_empty(user, "title"));

    [
        ticket.title.as_deref(),
        display_name,
        ticket.description.as_deref(),
        user_title,
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

fn incident_site(ticket: &CanonicalTicket) -> Option<String> {
    if let Some(location) = ticket.location.as_deref().filter(|text| !text.trim().is_empty()) {
        return Some(location.to_string());
    }
    // Ticketing records carry a structured location under `location_id`, with
    // its `name` renamed to `ticket_number`.
    ["location", "location_id"]
        .into_iter()
        .filter_map(|key| ticket.extra.get(key)?.as_object())
        .find_map(|location| {
            non_empty(location, "ticket_number").or_else(|| non_empty(location, "name"))
        })
        .map(str::to_string)
}

fn affected_user(ticket: &CanonicalTicket) -> Option<&Map<String, Value>> {
    ticket.extra.get("affectedUser")?.as_object()
}

fn non_empty<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

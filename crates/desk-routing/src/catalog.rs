use std::path::{Path, PathBuf};

use async_trait::async_trait;
use desk_core::{AdviceError, SupportGroupEntry, TicketCategory};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::location::{extract_location_token, is_excluded, score_candidate};
use crate::matching::{KeywordIndex, RoutingHints, SiteDirectory};

/// Entries that exist in the source list only as form placeholders.
const PLACEHOLDER_GROUPS: [&str; 3] = [
    "--Please Select a Support Group--",
    "--Select--",
    "Unassigned",
];

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Assignable groups for `category`. `CatalogUnavailable` when the backing list cannot be read.
    async fn load_catalog(&self, category: TicketCategory)
    -> Result<Vec<SupportGroupEntry>, AdviceError>;

    /// Site directory and group keywords used to narrow the catalog.
    async fn load_hints(&self) -> Result<RoutingHints, AdviceError> {
        Ok(RoutingHints::default())
    }
}

/// Reads the JSON snapshots from disk on every call.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
    sites_path: Option<PathBuf>,
    keywords_path: Option<PathBuf>,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sites_path: None,
            keywords_path: None,
        }
    }

    /// `{"locations": [{"category": .., "sites": [{"name": ..}]}]}`
    pub fn with_sites(mut self, path: impl Into<PathBuf>) -> Self {
        self.sites_path = Some(path.into());
        self
    }

    /// `[{"name": <group>, "keywords": [..]}]`
    pub fn with_keywords(mut self, path: impl Into<PathBuf>) -> Self {
        self.keywords_path = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for JsonFileCatalog {
    async fn load_catalog(
        &self,
        category: TicketCategory,
    ) -> Result<Vec<SupportGroupEntry>, AdviceError> {
        let entries = read_snapshot(&self.path).await?;
        Ok(filter_assignable(entries, category))
    }

    async fn load_hints(&self) -> Result<RoutingHints, AdviceError> {
        let sites = match &self.sites_path {
            Some(path) => read_snapshot::<SiteDirectory>(path).await?,
            None => SiteDirectory::default(),
        };
        let keywords = match &self.keywords_path {
            Some(path) => Some(read_snapshot::<KeywordIndex>(path).await?),
            None => None,
        };
        Ok(RoutingHints { sites, keywords })
    }
}

async fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, AdviceError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AdviceError::CatalogUnavailable(format!("{}: {err}", path.display())))?;
    serde_json::from_str(&raw).map_err(|err| {
        AdviceError::CatalogUnavailable(format!("invalid snapshot {}: {err}", path.display()))
    })
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<SupportGroupEntry>,
    hints: RoutingHints,
}

impl StaticCatalog {
    pub fn new(entries: Vec<SupportGroupEntry>) -> Self {
        Self {
            entries,
            hints: RoutingHints::default(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, AdviceError> {
        parse_snapshot(raw).map(Self::new)
    }

    pub fn with_hints(mut self, hints: RoutingHints) -> Self {
        self.hints = hints;
        self
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn load_catalog(
        &self,
        category: TicketCategory,
    ) -> Result<Vec<SupportGroupEntry>, AdviceError> {
        Ok(filter_assignable(self.entries.clone(), category))
    }

    async fn load_hints(&self) -> Result<RoutingHints, AdviceError> {
        Ok(self.hints.clone())
    }
}

fn parse_snapshot(raw: &str) -> Result<Vec<SupportGroupEntry>, AdviceError> {
    serde_json::from_str(raw)
        .map_err(|err| AdviceError::CatalogUnavailable(format!("invalid catalog snapshot: {err}")))
}

pub fn is_placeholder(name: &str) -> bool {
    let name = name.trim();
    name.is_empty()
        || PLACEHOLDER_GROUPS
            .iter()
            .any(|placeholder| placeholder.eq_ignore_ascii_case(name))
}

pub fn filter_assignable(
    entries: Vec<SupportGroupEntry>,
    category: TicketCategory,
) -> Vec<SupportGroupEntry> {
    let total = entries.len();
    let kept: Vec<_> = entries
        .into_iter()
        .filter(|entry| {
            entry.category == category && entry.is_assignable() && !is_placeholder(&entry.name)
        })
        .collect();

    debug!(
        category = category.code(),
        total,
        kept = kept.len(),
        "filtered support group catalog"
    );
    kept
}

/// Catalog split into groups named after the ticket's site and the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogPartition {
    pub location_specific: Vec<SupportGroupEntry>,
    pub global: Vec<SupportGroupEntry>,
}

/// A group belongs to the site when the location resolver would score it.
pub fn partition_by_location(entries: &[SupportGroupEntry], location_text: &str) -> CatalogPartition {
    let Some(token) = extract_location_token(location_text) else {
        return CatalogPartition {
            location_specific: Vec::new(),
            global: entries.to_vec(),
        };
    };

    let (location_specific, global): (Vec<_>, Vec<_>) = entries
        .iter()
        .cloned()
        .partition(|entry| {
            !is_excluded(&entry.name) && score_candidate(&token, &entry.name) > 0
        });

    CatalogPartition {
        location_specific,
        global,
    }
}

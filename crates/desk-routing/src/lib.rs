pub mod catalog;
pub mod location;
pub mod matching;

pub use catalog::{
    CatalogPartition, CatalogSource, JsonFileCatalog, StaticCatalog, filter_assignable,
    partition_by_location,
};
pub use location::{DEFAULT_GENERIC_GROUP, LocationResolver, extract_location_token, score_candidate};
pub use matching::{
    KeywordIndex, LocationMatch, RoutingHints, SiteDirectory, match_locations,
    match_support_groups, ticket_content,
};

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct DatabricksConfig {
    pub api_key: String,
    pub server_hostname: String,
    pub http_path: String,
    pub embedding_url: Option<String>,
    pub chat_url: Option<String>,
}

impl DatabricksConfig {
    /// The SQL warehouse id is the last segment of the HTTP path.
    pub fn warehouse_id(&self) -> &str {
        self.http_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct AthenaConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub auth_url: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub http_addr: String,
    pub databricks: DatabricksConfig,
    pub athena: AthenaConfig,
    pub support_groups_path: String,
    pub locations_path: Option<String>,
    pub support_group_keywords_path: Option<String>,
    pub exclude_support_group_keywords: Vec<String>,
    pub tickets_table: String,
    pub ticket_vector_index: String,
    pub docs_vector_index: String,
    pub evidence_timeout: Duration,
    pub similar_ticket_limit: usize,
    pub document_limit: usize,
    pub llm_max_attempts: u32,
    pub generic_support_group: String,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        default_http_addr: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} is required"));
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let databricks = DatabricksConfig {
            api_key: required("DATABRICKS_API_KEY")?,
            server_hostname: required("DATABRICKS_SERVER_HOSTNAME")?,
            http_path: required("DATABRICKS_HTTP_PATH")?,
            embedding_url: var("DATABRICKS_EMBEDDING_URL"),
            chat_url: var("DATABRICKS_CHAT_URL"),
        };
        let athena = AthenaConfig {
            username: var("ATHENA_USERNAME"),
            password: var("ATHENA_PASSWORD"),
            client_id: var("ATHENA_CLIENT_ID"),
            auth_url: var("ATHENA_AUTH_URL"),
            base_url: var("ATHENA_BASE_URL"),
        };

        Ok(Self {
            http_addr: or_default("HTTP_ADDR", default_http_addr),
            databricks,
            athena,
            support_groups_path: or_default("SUPPORT_GROUPS_PATH", "support_groups.json"),
            locations_path: var("LOCATIONS_PATH"),
            support_group_keywords_path: var("SUPPORT_GROUP_KEYWORDS_PATH"),
            exclude_support_group_keywords: var("EXCLUDE_SUPPORT_GROUP_KEYWORDS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            tickets_table: or_default("TICKETS_TABLE", "prepared.ticketing.athena_tickets"),
            ticket_vector_index: or_default(
                "TICKET_VECTOR_INDEX",
                "prepared.ticketing.athena_tickets_index",
            ),
            docs_vector_index: or_default("DOCS_VECTOR_INDEX", "prepared.onenote.documents_index"),
            evidence_timeout: Duration::from_secs(parse_or(&var, "EVIDENCE_TIMEOUT_SECS", 45)?),
            similar_ticket_limit: parse_or(&var, "SIMILAR_TICKET_LIMIT", 5)?,
            document_limit: parse_or(&var, "DOCUMENT_LIMIT", 5)?,
            llm_max_attempts: parse_or(&var, "LLM_MAX_ATTEMPTS", 3)?,
            generic_support_group: or_default("GENERIC_SUPPORT_GROUP", "EUS"),
        })
    }
}

/// Comma-separated list, blanks dropped.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}

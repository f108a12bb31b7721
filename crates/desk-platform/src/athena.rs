//! Ticketing system client: OAuth2 password grant plus a small ticket REST surface.

use std::time::Duration;

use async_trait::async_trait;
use desk_core::{RawRecord, ToolError};
use desk_tools::{TicketFilter, TicketingTool};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::AthenaConfig;
use crate::http::{build_client, join_url, read_json};

const SERVICE: &str = "ticketing";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TicketList {
    Bare(Vec<RawRecord>),
    Wrapped { items: Vec<RawRecord> },
}

pub struct AthenaTicketing {
    client: Client,
    config: AthenaConfig,
    token: RwLock<Option<String>>,
}

impl AthenaTicketing {
    pub fn new(config: AthenaConfig) -> Result<Self, ToolError> {
        Ok(Self {
            client: build_client(SERVICE, Duration::from_secs(30))?,
            config,
            token: RwLock::new(None),
        })
    }

    fn base_url(&self) -> Result<&str, ToolError> {
        self.config
            .base_url
            .as_deref()
            .ok_or(ToolError::NotConfigured("ATHENA_BASE_URL"))
    }

    async fn fetch_token(&self) -> Result<String, ToolError> {
        let AthenaConfig {
            username: Some(username),
            password: Some(password),
            client_id: Some(client_id),
            auth_url: Some(auth_url),
            ..
        } = &self.config
        else {
            return Err(ToolError::NotConfigured("ATHENA_USERNAME"));
        };

        debug!("requesting ticketing access token");
        let response = self
            .client
            .post(join_url(auth_url, "oauth2/token"))
            .form(&[
                ("username", username.as_str()),
                ("password", password.as_str()),
                ("grant_type", "password"),
                ("client_id", client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|err| ToolError::transport(SERVICE, err))?;

        let token: TokenResponse = read_json(SERVICE, response).await?;
        let token = token
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ToolError::decode(SERVICE, "token response has no access_token"))?;
        info!("ticketing access token acquired");
        Ok(token)
    }

    async fn token(&self) -> Result<String, ToolError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }
        let token = self.fetch_token().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Sends with the cached token; a 401 refreshes it and retries once.
    async fn send(&self, build: impl Fn(&str) -> RequestBuilder) -> Result<Response, ToolError> {
        let token = self.token().await?;
        let response = build(&token)
            .send()
            .await
            .map_err(|err| ToolError::transport(SERVICE, err))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("ticketing token rejected, refreshing");
        self.token.write().await.take();
        let token = self.token().await?;
        build(&token)
            .send()
            .await
            .map_err(|err| ToolError::transport(SERVICE, err))
    }

    /// Ticket ids travel as one percent-encoded path segment.
    fn ticket_url(&self, ticket_id: &str) -> Result<Url, ToolError> {
        let collection = join_url(self.base_url()?, "tickets");
        let mut url =
            Url::parse(&collection).map_err(|err| ToolError::transport(SERVICE, err))?;
        url.path_segments_mut()
            .map_err(|_| ToolError::transport(SERVICE, format!("{collection} cannot take a path")))?
            .push(ticket_id);
        Ok(url)
    }
}

#[async_trait]
impl TicketingTool for AthenaTicketing {
    #[instrument(skip(self))]
    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<RawRecord>, ToolError> {
        let url = self.ticket_url(ticket_id)?;
        let response = self
            .send(|token| self.client.get(url.clone()).bearer_auth(token))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("ticket not found in ticketing system");
            return Ok(None);
        }
        read_json(SERVICE, response).await.map(Some)
    }

    #[instrument(skip(self))]
    async fn get_tickets_by_filter(
        &self,
        filter: &TicketFilter,
    ) -> Result<Vec<RawRecord>, ToolError> {
        let url = join_url(self.base_url()?, "tickets");
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(category) = filter.category {
            query.push(("ticketType", category.code().to_string()));
        }
        if let Some(group) = &filter.support_group {
            query.push(("supportGroupValue", group.clone()));
        }
        if let Some(status) = &filter.status {
            query.push(("statusValue", status.clone()));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }

        let response = self
            .send(|token| self.client.get(&url).bearer_auth(token).query(&query))
            .await?;
        let list: TicketList = read_json(SERVICE, response).await?;
        Ok(match list {
            TicketList::Bare(items) | TicketList::Wrapped { items } => items,
        })
    }

    #[instrument(skip(self, fields))]
    async fn modify_ticket(&self, ticket_id: &str, fields: &RawRecord) -> Result<(), ToolError> {
        let url = self.ticket_url(ticket_id)?;
        let response = self
            .send(|token| self.client.patch(url.clone()).bearer_auth(token).json(fields))
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        info!(fields = fields.len(), "ticket updated");
        Ok(())
    }
}

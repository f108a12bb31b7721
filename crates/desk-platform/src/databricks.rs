//! SQL statement execution against a Databricks SQL warehouse.

use std::time::Duration;

use async_trait::async_trait;
use desk_core::{RawRecord, ToolError};
use desk_tools::WarehouseTool;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::DatabricksConfig;
use crate::http::{build_client, join_url, read_json};

const SERVICE: &str = "warehouse";
const STATEMENTS_PATH: &str = "api/2.0/sql/statements";
const DEFAULT_MAX_RESULTS: usize = 20;

/// Column layout of the tickets table, used when a result carries no schema.
pub const TICKET_COLUMNS: [&str; 33] = [
    "TicketType",
    "Location",
    "Floor",
    "Room",
    "CreatedDate",
    "ResolvedDate",
    "Priority",
    "Id",
    "Title",
    "Description",
    "SupportGroup",
    "Source",
    "Status",
    "Impact",
    "Urgency",
    "AssignedToUserName",
    "AffectedUserName",
    "LastModifiedDate",
    "Escalated",
    "First_Call_Resolution",
    "Classification/Area",
    "ResolutionCategory",
    "ResolutionNotes",
    "CommandCenter",
    "ConfirmedResolution",
    "Increments",
    "FeedbackValue",
    "Feedback_Notes",
    "Tags",
    "Specialty",
    "Next_Steps",
    "User_Assign_Change",
    "Support_Group_Change",
];

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    statement_id: Option<String>,
    #[serde(default)]
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    schema: Option<Schema>,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    columns: Vec<Column>,
}

#[derive(Debug, Deserialize)]
struct Column {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultData {
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    data_array: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct DatabricksWarehouse {
    client: Client,
    base_url: String,
    api_key: String,
    warehouse_id: String,
    max_results: usize,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl DatabricksWarehouse {
    pub fn new(config: &DatabricksConfig) -> Result<Self, ToolError> {
        Ok(Self {
            client: build_client(SERVICE, Duration::from_secs(60))?,
            base_url: format!("https://{}", config.server_hostname),
            api_key: config.api_key.clone(),
            warehouse_id: config.warehouse_id().to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(60),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    async fn submit(&self, statement: &str) -> Result<StatementResponse, ToolError> {
        let response = self
            .client
            .post(join_url(&self.base_url, STATEMENTS_PATH))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "warehouse_id": self.warehouse_id,
                "statement": statement,
                "wait_timeout": "30s",
            }))
            .send()
            .await
            .map_err(|err| ToolError::transport(SERVICE, err))?;
        read_json(SERVICE, response).await
    }

    async fn poll(&self, statement_id: &str) -> Result<StatementResponse, ToolError> {
        let response = self
            .client
            .get(join_url(
                &self.base_url,
                &format!("{STATEMENTS_PATH}/{statement_id}"),
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| ToolError::transport(SERVICE, err))?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl WarehouseTool for DatabricksWarehouse {
    #[instrument(skip_all, fields(warehouse_id = %self.warehouse_id))]
    async fn run_query(&self, sql: &str) -> Result<Vec<RawRecord>, ToolError> {
        let statement = prepare_statement(sql, self.max_results);
        debug!(statement = %truncated(&statement, 100), "submitting statement");

        let deadline = Instant::now() + self.poll_timeout;
        let mut response = self.submit(&statement).await?;
        loop {
            let state = response.status.state.clone();
            match state.as_str() {
                "SUCCEEDED" => return Ok(into_records(response)),
                "PENDING" | "RUNNING" => {}
                state => {
                    let message = response
                        .status
                        .error
                        .map(|error| error.message)
                        .filter(|message| !message.is_empty())
                        .unwrap_or_else(|| format!("statement ended in state {state:?}"));
                    warn!(state, %message, "statement failed");
                    return Err(ToolError::Query(message));
                }
            }

            let Some(statement_id) = response.statement_id.clone() else {
                return Err(ToolError::decode(SERVICE, "pending statement has no id"));
            };
            if Instant::now() + self.poll_interval > deadline {
                return Err(ToolError::Query(format!(
                    "statement {statement_id} still running after {:?}",
                    self.poll_timeout
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            response = self.poll(&statement_id).await?;
        }
    }
}

/// Strips a trailing semicolon and caps the result size unless the statement already does.
pub fn prepare_statement(sql: &str, max_results: usize) -> String {
    let statement = sql.trim();
    let statement = statement.strip_suffix(';').unwrap_or(statement).trim_end();
    if statement.to_uppercase().contains("LIMIT") {
        statement.to_string()
    } else {
        format!("{statement} LIMIT {max_results}")
    }
}

fn into_records(response: StatementResponse) -> Vec<RawRecord> {
    let Some(result) = response.result else {
        return Vec::new();
    };

    let mut columns: Vec<String> = response
        .manifest
        .and_then(|manifest| manifest.schema)
        .map(|schema| schema.columns.into_iter().map(|column| column.name).collect())
        .unwrap_or_default();
    if columns.is_empty() {
        columns = result.columns.into_iter().map(|column| column.name).collect();
    }
    if columns.is_empty() {
        columns = TICKET_COLUMNS.iter().map(|name| name.to_string()).collect();
    }

    result
        .data_array
        .into_iter()
        .map(|row| columns.iter().cloned().zip(row).collect())
        .collect()
}

fn truncated(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config() -> DatabricksConfig {
        DatabricksConfig {
            api_key: "dapi-test".to_string(),
            server_hostname: "unused".to_string(),
            http_path: "/sql/1.0/warehouses/wh42".to_string(),
            embedding_url: None,
            chat_url: None,
        }
    }

    async fn warehouse(server: &MockServer) -> DatabricksWarehouse {
        DatabricksWarehouse::new(&config())
            .unwrap()
            .with_base_url(server.uri())
            .with_polling(Duration::from_millis(10), Duration::from_secs(2))
    }

    #[test]
    fn statements_are_trimmed_and_limited() {
        assert_eq!(
            prepare_statement("SELECT * FROM t WHERE Id IN ('IR1');", 20),
            "SELECT * FROM t WHERE Id IN ('IR1') LIMIT 20"
        );
        assert_eq!(
            prepare_statement("select * from t limit 3", 20),
            "select * from t limit 3"
        );
    }

    #[tokio::test]
    async fn rows_are_keyed_by_manifest_columns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2.0/sql/statements"))
            .and(header("authorization", "Bearer dapi-test"))
            .and(body_partial_json(json!({
                "warehouse_id": "wh42",
                "statement": "SELECT Id, Title FROM t LIMIT 20",
                "wait_timeout": "30s"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statement_id": "s1",
                "status": { "state": "SUCCEEDED" },
                "manifest": { "schema": { "columns": [{ "name": "Id" }, { "name": "Title" }] } },
                "result": { "data_array": [["IR1", "Printer jam"], ["IR2", null]] }
            })))
            .mount(&server)
            .await;

        let rows = warehouse(&server)
            .await
            .run_query("SELECT Id, Title FROM t;")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Id"], json!("IR1"));
        assert_eq!(rows[0]["Title"], json!("Printer jam"));
        assert_eq!(rows[1]["Title"], Value::Null);
    }

    #[tokio::test]
    async fn rows_without_schema_use_ticket_layout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": { "state": "SUCCEEDED" },
                "result": { "data_array": [["ir", "RITTENHOUSE - MAIN BLDG", "2"]] }
            })))
            .mount(&server)
            .await;

        let rows = warehouse(&server).await.run_query("SELECT * FROM t").await.unwrap();

        assert_eq!(rows[0]["TicketType"], json!("ir"));
        assert_eq!(rows[0]["Location"], json!("RITTENHOUSE - MAIN BLDG"));
        assert_eq!(rows[0]["Floor"], json!("2"));
        assert_eq!(rows[0].len(), 3);
    }

    #[tokio::test]
    async fn pending_statements_are_polled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statement_id": "s9",
                "status": { "state": "PENDING" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/sql/statements/s9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statement_id": "s9",
                "status": { "state": "SUCCEEDED" },
                "manifest": { "schema": { "columns": [{ "name": "Id" }] } },
                "result": { "data_array": [["IR7"]] }
            })))
            .mount(&server)
            .await;

        let rows = warehouse(&server).await.run_query("SELECT Id FROM t").await.unwrap();
        assert_eq!(rows[0]["Id"], json!("IR7"));
    }

    #[tokio::test]
    async fn failed_statements_carry_the_warehouse_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statement_id": "s2",
                "status": { "state": "FAILED", "error": { "message": "TABLE_OR_VIEW_NOT_FOUND" } }
            })))
            .mount(&server)
            .await;

        let err = warehouse(&server).await.run_query("SELECT 1").await.unwrap_err();
        assert_eq!(err, ToolError::Query("TABLE_OR_VIEW_NOT_FOUND".to_string()));
    }

    #[tokio::test]
    async fn http_errors_keep_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let err = warehouse(&server).await.run_query("SELECT 1").await.unwrap_err();
        assert_eq!(
            err,
            ToolError::Status {
                service: "warehouse",
                status: 403,
                body: "invalid token".to_string()
            }
        );
    }
}

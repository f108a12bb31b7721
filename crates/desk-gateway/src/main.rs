use std::{
    cmp::{max, min},
    convert::Infallible,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use chrono::Utc;
use desk_advisor::{AdviceOrchestrator, AdviceService, AdvisorConfig, EvidenceConfig, RetryPolicy};
use desk_core::{AdviceError, AdviceEvent, Priority};
use desk_platform::{
    AthenaTicketing, ChatCompletionClient, DatabricksWarehouse, EmbeddingClient,
    ImplementAssignmentRequest, ImplementAssignmentResponse, ServiceConfig, TicketAdviceRequest,
    TicketAdviceResponse, ValidationTicketsQuery, ValidationTicketsResponse,
};
use desk_routing::JsonFileCatalog;
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_VALIDATION_LIMIT: usize = 50;
const MAX_VALIDATION_LIMIT: usize = 200;

#[derive(Clone)]
struct AppState {
    advisor: Arc<dyn AdviceService>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "desk_gateway=info,desk_advisor=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let advisor = AdviceOrchestrator::new(
        AthenaTicketing::new(config.athena.clone())?,
        DatabricksWarehouse::new(&config.databricks)?,
        EmbeddingClient::new(&config.databricks)?,
        ChatCompletionClient::new(&config.databricks)?,
        Arc::new(catalog(&config)),
        advisor_config(&config),
    );

    let state = AppState {
        advisor: Arc::new(advisor),
    };
    let router = router(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/get-ticket-advice", post(get_ticket_advice))
        .route("/api/get-ticket-advice/stream", get(stream_ticket_advice))
        .route("/api/get-validation-tickets", get(get_validation_tickets))
        .route("/api/implement-assignment", post(implement_assignment))
        .with_state(state)
}

fn catalog(config: &ServiceConfig) -> JsonFileCatalog {
    let mut catalog = JsonFileCatalog::new(&config.support_groups_path);
    if let Some(path) = &config.locations_path {
        catalog = catalog.with_sites(path);
    }
    if let Some(path) = &config.support_group_keywords_path {
        catalog = catalog.with_keywords(path);
    }
    catalog
}

fn advisor_config(config: &ServiceConfig) -> AdvisorConfig {
    AdvisorConfig {
        evidence: EvidenceConfig {
            tickets_table: config.tickets_table.clone(),
            ticket_index: config.ticket_vector_index.clone(),
            docs_index: config.docs_vector_index.clone(),
            similar_limit: config.similar_ticket_limit,
            document_limit: config.document_limit,
            ..EvidenceConfig::default()
        },
        evidence_timeout: config.evidence_timeout,
        retry: RetryPolicy::default().with_max_attempts(config.llm_max_attempts),
        generic_group: config.generic_support_group.clone(),
        exclude_keywords: config.exclude_support_group_keywords.clone(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_ticket_advice(
    State(state): State<AppState>,
    Json(payload): Json<TicketAdviceRequest>,
) -> Result<Json<TicketAdviceResponse>, (StatusCode, String)> {
    let ticket_id = required_ticket_id(&payload.ticket_id)?;
    let request_id = Uuid::new_v4();
    info!(%request_id, ticket_id, "advice requested");

    let advice = state
        .advisor
        .get_advice(ticket_id)
        .await
        .map_err(advice_error)?;

    Ok(Json(TicketAdviceResponse {
        request_id,
        advice,
        generated_at: Utc::now(),
    }))
}

async fn stream_ticket_advice(
    State(state): State<AppState>,
    Query(query): Query<TicketAdviceRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let ticket_id = required_ticket_id(&query.ticket_id)?.to_string();
    info!(ticket_id, "streamed advice requested");

    let events = state.advisor.clone().stream_advice(ticket_id);
    let stream = UnboundedReceiverStream::new(events).map(|event| Ok(sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

async fn get_validation_tickets(
    State(state): State<AppState>,
    Query(query): Query<ValidationTicketsQuery>,
) -> Result<Json<ValidationTicketsResponse>, (StatusCode, String)> {
    let limit = min(
        max(query.limit.unwrap_or(DEFAULT_VALIDATION_LIMIT), 1),
        MAX_VALIDATION_LIMIT,
    );
    let tickets = state
        .advisor
        .validation_queue(limit)
        .await
        .map_err(advice_error)?;

    Ok(Json(ValidationTicketsResponse {
        count: tickets.len(),
        tickets,
    }))
}

async fn implement_assignment(
    State(state): State<AppState>,
    Json(payload): Json<ImplementAssignmentRequest>,
) -> Result<(StatusCode, Json<ImplementAssignmentResponse>), (StatusCode, String)> {
    let ticket_id = required_ticket_id(&payload.ticket_id)?;
    let support_group = payload.support_group.trim();
    if support_group.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "support_group is required".to_string(),
        ));
    }
    let priority = Priority::parse(&payload.priority).ok_or_else(|| {
        invalid_request(anyhow::anyhow!(
            "priority must be High, Medium or Low, got {:?}",
            payload.priority
        ))
    })?;

    state
        .advisor
        .apply_assignment(ticket_id, support_group, priority)
        .await
        .map_err(advice_error)?;

    Ok((
        StatusCode::OK,
        Json(ImplementAssignmentResponse {
            ticket_id: ticket_id.to_string(),
            support_group: support_group.to_string(),
            priority: priority.to_string(),
            status: "ASSIGNED".to_string(),
            applied_at: Utc::now(),
        }),
    ))
}

fn sse_event(event: &AdviceEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.name()).data(json)
}

fn required_ticket_id(ticket_id: &str) -> Result<&str, (StatusCode, String)> {
    let ticket_id = ticket_id.trim();
    if ticket_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "ticket_id is required".to_string()));
    }
    Ok(ticket_id)
}

fn advice_error(err: AdviceError) -> (StatusCode, String) {
    let status = match &err {
        AdviceError::NotFound(_) => StatusCode::NOT_FOUND,
        AdviceError::RecommendationFailed { .. }
        | AdviceError::Transport(_)
        | AdviceError::MalformedResponse(_)
        | AdviceError::Validation { .. } => StatusCode::BAD_GATEWAY,
        AdviceError::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AdviceError::Configuration(_) => return internal_error(&err),
    };
    warn!(kind = err.kind(), status = status.as_u16(), error = %err, "advice request failed");
    (status, err.to_string())
}

fn invalid_request(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use desk_core::{
        CanonicalTicket, EvidenceBundle, RecommendationResult, TicketAdvice, ToolError,
    };
    use desk_routing::CatalogSource;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::*;

    #[derive(Default)]
    struct FakeAdvisor {
        assignments: Mutex<Vec<(String, String, Priority)>>,
        limits: Mutex<Vec<usize>>,
    }

    fn advice(ticket_id: &str) -> TicketAdvice {
        TicketAdvice {
            ticket: CanonicalTicket {
                id: ticket_id.to_string(),
                ..CanonicalTicket::default()
            },
            evidence: EvidenceBundle::default(),
            recommendation: RecommendationResult {
                support_group: "RITT - EUS".to_string(),
                priority: Priority::Low,
                explanation: "Printer at Rittenhouse.".to_string(),
                second_choice: None,
                third_choice: None,
            },
            attempts: 1,
        }
    }

    #[async_trait]
    impl AdviceService for FakeAdvisor {
        async fn get_advice(&self, ticket_id: &str) -> Result<TicketAdvice, AdviceError> {
            match ticket_id {
                "IR404" => Err(AdviceError::NotFound(ticket_id.to_string())),
                "IR502" => Err(AdviceError::RecommendationFailed {
                    attempts: 3,
                    reason: "malformed".to_string(),
                }),
                _ => Ok(advice(ticket_id)),
            }
        }

        fn stream_advice(self: Arc<Self>, ticket_id: String) -> mpsc::UnboundedReceiver<AdviceEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(AdviceEvent::completed(advice(&ticket_id)));
            rx
        }

        async fn validation_queue(&self, limit: usize) -> Result<Vec<CanonicalTicket>, AdviceError> {
            self.limits.lock().unwrap().push(limit);
            Ok(vec![CanonicalTicket {
                id: "IR77".to_string(),
                support_group: Some("Validation".to_string()),
                ..CanonicalTicket::default()
            }])
        }

        async fn apply_assignment(
            &self,
            ticket_id: &str,
            support_group: &str,
            priority: Priority,
        ) -> Result<(), AdviceError> {
            if ticket_id == "IR500" {
                return Err(AdviceError::Transport(ToolError::transport(
                    "ticketing",
                    "connection refused",
                )));
            }
            self.assignments.lock().unwrap().push((
                ticket_id.to_string(),
                support_group.to_string(),
                priority,
            ));
            Ok(())
        }
    }

    fn state() -> (AppState, Arc<FakeAdvisor>) {
        let advisor = Arc::new(FakeAdvisor::default());
        (
            AppState {
                advisor: advisor.clone(),
            },
            advisor,
        )
    }

    fn advice_request(ticket_id: &str) -> Json<TicketAdviceRequest> {
        Json(TicketAdviceRequest {
            ticket_id: ticket_id.to_string(),
        })
    }

    #[tokio::test]
    async fn advice_is_returned_with_a_request_id() {
        let (state, _) = state();
        let Json(response) = get_ticket_advice(State(state), advice_request(" IR10000001 "))
            .await
            .unwrap();

        assert_eq!(response.advice.ticket.id, "IR10000001");
        assert_eq!(response.advice.recommendation.support_group, "RITT - EUS");
        assert!(!response.request_id.is_nil());
    }

    #[tokio::test]
    async fn advice_errors_map_to_http_statuses() {
        let (state, _) = state();

        let blank = get_ticket_advice(State(state.clone()), advice_request("  ")).await;
        assert_eq!(blank.unwrap_err().0, StatusCode::BAD_REQUEST);

        let missing = get_ticket_advice(State(state.clone()), advice_request("IR404")).await;
        assert_eq!(missing.unwrap_err().0, StatusCode::NOT_FOUND);

        let failed = get_ticket_advice(State(state), advice_request("IR502")).await;
        assert_eq!(failed.unwrap_err().0, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn validation_limit_is_clamped() {
        let (state, advisor) = state();

        let Json(response) = get_validation_tickets(
            State(state.clone()),
            Query(ValidationTicketsQuery { limit: Some(10_000) }),
        )
        .await
        .unwrap();
        assert_eq!(response.count, 1);

        get_validation_tickets(State(state), Query(ValidationTicketsQuery::default()))
            .await
            .unwrap();
        assert_eq!(*advisor.limits.lock().unwrap(), vec![MAX_VALIDATION_LIMIT, DEFAULT_VALIDATION_LIMIT]);
    }

    #[tokio::test]
    async fn assignment_validates_priority_and_writes_back() {
        let (state, advisor) = state();

        let rejected = implement_assignment(
            State(state.clone()),
            Json(ImplementAssignmentRequest {
                ticket_id: "IR1".to_string(),
                support_group: "RITT - EUS".to_string(),
                priority: "urgent".to_string(),
            }),
        )
        .await;
        assert_eq!(rejected.unwrap_err().0, StatusCode::BAD_REQUEST);

        let (status, Json(response)) = implement_assignment(
            State(state.clone()),
            Json(ImplementAssignmentRequest {
                ticket_id: "IR1".to_string(),
                support_group: "RITT - EUS".to_string(),
                priority: "low".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.priority, "Low");
        assert_eq!(
            *advisor.assignments.lock().unwrap(),
            vec![("IR1".to_string(), "RITT - EUS".to_string(), Priority::Low)]
        );

        let upstream_down = implement_assignment(
            State(state),
            Json(ImplementAssignmentRequest {
                ticket_id: "IR500".to_string(),
                support_group: "RITT - EUS".to_string(),
                priority: "High".to_string(),
            }),
        )
        .await;
        assert_eq!(upstream_down.unwrap_err().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn configuration_problems_are_internal_errors() {
        let (status, _) = advice_error(AdviceError::Configuration("no catalog path".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn advisor_settings_come_from_service_config() {
        let config = ServiceConfig::from_lookup("0.0.0.0:8080", |key| match key {
            "DATABRICKS_API_KEY" => Some("k".to_string()),
            "DATABRICKS_SERVER_HOSTNAME" => Some("h".to_string()),
            "DATABRICKS_HTTP_PATH" => Some("/sql/1.0/warehouses/w".to_string()),
            "LLM_MAX_ATTEMPTS" => Some("4".to_string()),
            "SIMILAR_TICKET_LIMIT" => Some("7".to_string()),
            "EXCLUDE_SUPPORT_GROUP_KEYWORDS" => Some("Network,Telecom".to_string()),
            _ => None,
        })
        .unwrap();

        let advisor = advisor_config(&config);
        assert_eq!(advisor.retry.max_attempts, 4);
        assert_eq!(advisor.evidence.similar_limit, 7);
        assert_eq!(advisor.evidence.tickets_table, "prepared.ticketing.athena_tickets");
        assert_eq!(advisor.evidence_timeout, Duration::from_secs(45));
        assert_eq!(advisor.generic_group, "EUS");
        assert_eq!(advisor.exclude_keywords, vec!["Network", "Telecom"]);
    }

    #[tokio::test]
    async fn catalog_wires_configured_snapshots() {
        let config = ServiceConfig::from_lookup("0.0.0.0:8080", |key| match key {
            "DATABRICKS_API_KEY" => Some("k".to_string()),
            "DATABRICKS_SERVER_HOSTNAME" => Some("h".to_string()),
            "DATABRICKS_HTTP_PATH" => Some("/sql/1.0/warehouses/w".to_string()),
            "LOCATIONS_PATH" => Some("/nonexistent/locations.json".to_string()),
            _ => None,
        })
        .unwrap();

        let err = catalog(&config).load_hints().await.unwrap_err();
        assert!(matches!(err, AdviceError::CatalogUnavailable(_)));
    }
}

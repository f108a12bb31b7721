use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use desk_core::{
    AdviceError, AdviceEvent, AdviceStage, CanonicalTicket, Priority, RawRecord, SourceSchema,
    TicketAdvice, TicketCategory, normalize, to_upstream,
};
use desk_routing::{CatalogSource, LocationResolver, RoutingHints};
use desk_tools::sql::select_by_ids_sql;
use desk_tools::{EmbeddingTool, TextGenerationTool, TicketFilter, TicketingTool, WarehouseTool};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{Instrument, info, info_span, warn};

use crate::evidence::{EvidenceConfig, EvidenceGatherer};
use crate::prompt::UNCERTAIN_GROUP;
use crate::recommend::RecommendationRequester;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub evidence: EvidenceConfig,
    pub evidence_timeout: Duration,
    pub retry: RetryPolicy,
    pub generic_group: String,
    /// Global support groups containing any of these are never offered.
    pub exclude_keywords: Vec<String>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            evidence: EvidenceConfig::default(),
            evidence_timeout: Duration::from_secs(45),
            retry: RetryPolicy::default(),
            generic_group: desk_routing::DEFAULT_GENERIC_GROUP.to_string(),
            exclude_keywords: Vec::new(),
        }
    }
}

/// What the HTTP surface needs from an advisor.
#[async_trait]
pub trait AdviceService: Send + Sync {
    async fn get_advice(&self, ticket_id: &str) -> Result<TicketAdvice, AdviceError>;

    /// Progress events in stage order, then exactly one terminal event.
    fn stream_advice(self: Arc<Self>, ticket_id: String) -> mpsc::UnboundedReceiver<AdviceEvent>;

    /// Tickets parked in the validation queue, awaiting a human decision.
    async fn validation_queue(&self, limit: usize) -> Result<Vec<CanonicalTicket>, AdviceError>;

    async fn apply_assignment(
        &self,
        ticket_id: &str,
        support_group: &str,
        priority: Priority,
    ) -> Result<(), AdviceError>;
}

pub struct AdviceOrchestrator<TTicketing, TWarehouse, TEmbedding, TGeneration> {
    ticketing: TTicketing,
    warehouse: Arc<TWarehouse>,
    catalog: Arc<dyn CatalogSource>,
    evidence: EvidenceGatherer<TWarehouse, TEmbedding>,
    requester: RecommendationRequester<TGeneration>,
    evidence_timeout: Duration,
}

impl<TTicketing, TWarehouse, TEmbedding, TGeneration>
    AdviceOrchestrator<TTicketing, TWarehouse, TEmbedding, TGeneration>
where
    TTicketing: TicketingTool,
    TWarehouse: WarehouseTool,
    TEmbedding: EmbeddingTool,
    TGeneration: TextGenerationTool,
{
    pub fn new(
        ticketing: TTicketing,
        warehouse: TWarehouse,
        embedder: TEmbedding,
        generator: TGeneration,
        catalog: Arc<dyn CatalogSource>,
        config: AdvisorConfig,
    ) -> Self {
        let warehouse = Arc::new(warehouse);
        Self {
            ticketing,
            evidence: EvidenceGatherer::new(warehouse.clone(), Arc::new(embedder), config.evidence),
            warehouse,
            catalog,
            requester: RecommendationRequester::new(
                generator,
                config.retry,
                LocationResolver::new(config.generic_group),
            )
            .with_exclude_keywords(config.exclude_keywords),
            evidence_timeout: config.evidence_timeout,
        }
    }

    /// Ticketing system first, then the warehouse copy.
    pub async fn fetch_ticket(&self, ticket_id: &str) -> Result<CanonicalTicket, AdviceError> {
        let ticket_id = ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(AdviceError::NotFound(String::new()));
        }

        let mut ticket = match self.ticketing.get_ticket(ticket_id).await {
            Ok(Some(raw)) => normalize(raw, SourceSchema::Ticketing),
            Ok(None) => self.warehouse_ticket(ticket_id).await?,
            Err(err) => {
                warn!(ticket_id, error = %err, "ticketing lookup failed, trying warehouse");
                self.warehouse_ticket(ticket_id).await?
            }
        };
        if ticket.id.is_empty() {
            ticket.id = ticket_id.to_string();
        }
        Ok(ticket)
    }

    async fn warehouse_ticket(&self, ticket_id: &str) -> Result<CanonicalTicket, AdviceError> {
        let config = self.evidence.config();
        let rows = self
            .warehouse
            .run_query(&select_by_ids_sql(
                &config.tickets_table,
                &config.ticket_id_column,
                &[ticket_id.to_string()],
            ))
            .await?;

        rows.into_iter()
            .next()
            .map(|row| normalize(row, SourceSchema::Warehouse))
            .ok_or_else(|| AdviceError::NotFound(ticket_id.to_string()))
    }

    async fn run(
        &self,
        ticket_id: &str,
        events: Option<&mpsc::UnboundedSender<AdviceEvent>>,
    ) -> Result<TicketAdvice, AdviceError> {
        let report = |stage: AdviceStage, message: String| {
            info!(stage = stage.number(), %message, "advice progress");
            if let Some(events) = events {
                let _ = events.send(AdviceEvent::progress(stage, message));
            }
        };

        report(
            AdviceStage::FetchingTicket,
            format!("Fetching ticket {ticket_id}"),
        );
        let ticket = self.fetch_ticket(ticket_id).await?;

        let category = ticket.category();
        report(
            AdviceStage::LoadingCatalog,
            format!("Loading {} support groups", category_label(category)),
        );
        let catalog = self
            .catalog
            .load_catalog(category)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "continuing without a support group catalog");
                Vec::new()
            });
        let hints = self.catalog.load_hints().await.unwrap_or_else(|err| {
            warn!(error = %err, "continuing without site and keyword hints");
            RoutingHints::default()
        });

        report(
            AdviceStage::GatheringEvidence,
            "Searching similar tickets and documentation".to_string(),
        );
        let deadline = Instant::now() + self.evidence_timeout;
        let evidence = self.evidence.gather(&ticket, deadline).await;

        report(
            AdviceStage::RequestingRecommendation,
            format!(
                "Requesting recommendation with {} similar tickets and {} documents",
                evidence.similar_tickets.len(),
                evidence.documentation.len()
            ),
        );
        let outcome = self
            .requester
            .recommend(&ticket, &evidence, &catalog, &hints)
            .await?;

        let message = match &outcome.resolved_from {
            Some(generic) => format!(
                "Refined {generic} to {} for the ticket location",
                outcome.result.support_group
            ),
            None => format!("Recommending {}", outcome.result.support_group),
        };
        report(AdviceStage::ResolvingLocation, message);

        Ok(TicketAdvice {
            ticket,
            evidence,
            recommendation: outcome.result,
            attempts: outcome.attempts,
        })
    }
}

#[async_trait]
impl<TTicketing, TWarehouse, TEmbedding, TGeneration> AdviceService
    for AdviceOrchestrator<TTicketing, TWarehouse, TEmbedding, TGeneration>
where
    TTicketing: TicketingTool + 'static,
    TWarehouse: WarehouseTool + 'static,
    TEmbedding: EmbeddingTool + 'static,
    TGeneration: TextGenerationTool + 'static,
{
    async fn get_advice(&self, ticket_id: &str) -> Result<TicketAdvice, AdviceError> {
        self.run(ticket_id, None)
            .instrument(info_span!("get_advice", ticket_id))
            .await
    }

    fn stream_advice(self: Arc<Self>, ticket_id: String) -> mpsc::UnboundedReceiver<AdviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let span = info_span!("stream_advice", ticket_id = %ticket_id);
        tokio::spawn(
            async move {
                let terminal = match self.run(&ticket_id, Some(&tx)).await {
                    Ok(advice) => AdviceEvent::completed(advice),
                    Err(err) => {
                        warn!(kind = err.kind(), error = %err, "advice run failed");
                        AdviceEvent::failed(&err)
                    }
                };
                let _ = tx.send(terminal);
            }
            .instrument(span),
        );
        rx
    }

    async fn validation_queue(&self, limit: usize) -> Result<Vec<CanonicalTicket>, AdviceError> {
        let filter = TicketFilter {
            support_group: Some(UNCERTAIN_GROUP.to_string()),
            limit: Some(limit),
            ..TicketFilter::default()
        };
        let rows = self.ticketing.get_tickets_by_filter(&filter).await?;
        Ok(rows
            .into_iter()
            .map(|row| normalize(row, SourceSchema::Ticketing))
            .collect())
    }

    async fn apply_assignment(
        &self,
        ticket_id: &str,
        support_group: &str,
        priority: Priority,
    ) -> Result<(), AdviceError> {
        let mut fields = RawRecord::new();
        fields.insert("support_group".to_string(), json!(support_group));
        fields.insert("priority".to_string(), json!(priority.as_str()));

        self.ticketing
            .modify_ticket(ticket_id, &to_upstream(fields, SourceSchema::Ticketing))
            .await?;
        info!(ticket_id, support_group, %priority, "assignment applied");
        Ok(())
    }
}

fn category_label(category: TicketCategory) -> &'static str {
    match category {
        TicketCategory::Incident => "incident",
        TicketCategory::ServiceRequest => "service request",
    }
}

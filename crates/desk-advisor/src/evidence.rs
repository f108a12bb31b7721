//! Similar tickets and documentation gathered concurrently under one deadline.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use desk_core::{
    CanonicalTicket, DocEntry, EvidenceBundle, RawRecord, SourceSchema, ToolError, normalize,
};
use desk_tools::sql::{number_field, select_by_ids_sql, text_field};
use desk_tools::{EmbeddingTool, WarehouseTool};
use serde_json::json;
use tokio::time::{Instant, error::Elapsed, timeout_at};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceConfig {
    pub tickets_table: String,
    pub ticket_id_column: String,
    pub ticket_index: String,
    pub docs_index: String,
    pub similar_limit: usize,
    pub document_limit: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            tickets_table: "prepared.ticketing.athena_tickets".to_string(),
            ticket_id_column: "Id".to_string(),
            ticket_index: "prepared.ticketing.athena_tickets_index".to_string(),
            docs_index: "prepared.onenote.documents_index".to_string(),
            similar_limit: 5,
            document_limit: 5,
        }
    }
}

pub struct EvidenceGatherer<W, E> {
    warehouse: Arc<W>,
    embedder: Arc<E>,
    config: EvidenceConfig,
}

impl<W, E> EvidenceGatherer<W, E>
where
    W: WarehouseTool,
    E: EmbeddingTool,
{
    pub fn new(warehouse: Arc<W>, embedder: Arc<E>, config: EvidenceConfig) -> Self {
        Self {
            warehouse,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &EvidenceConfig {
        &self.config
    }

    /// Never fails: a branch that errors or misses `deadline` contributes nothing.
    #[instrument(skip_all, fields(ticket_id = %ticket.id))]
    pub async fn gather(&self, ticket: &CanonicalTicket, deadline: Instant) -> EvidenceBundle {
        let text = ticket.search_text();
        if text.is_empty() {
            debug!("ticket has no text to search with");
            return EvidenceBundle::default();
        }

        let (similar, documents) = tokio::join!(
            timeout_at(deadline, self.similar_tickets(&ticket.id, &text)),
            timeout_at(deadline, self.documentation(&text)),
        );

        let bundle = EvidenceBundle {
            similar_tickets: settle("similar_tickets", similar),
            documentation: settle("documentation", documents),
        };
        debug!(
            similar_tickets = bundle.similar_tickets.len(),
            documentation = bundle.documentation.len(),
            "evidence gathered"
        );
        bundle
    }

    /// Resolved tickets closest to `text`, best first, excluding `ticket_id`.
    pub async fn similar_tickets(
        &self,
        ticket_id: &str,
        text: &str,
    ) -> Result<Vec<CanonicalTicket>, ToolError> {
        let embedding = self.embed(text).await?;
        // One extra so dropping the ticket itself still leaves a full page.
        let mut hits = self
            .warehouse
            .similarity_search(
                &self.config.ticket_index,
                &embedding,
                self.config.similar_limit + 1,
            )
            .await?;
        hits.retain(|hit| !hit.id.eq_ignore_ascii_case(ticket_id));
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
        hits.truncate(self.config.similar_limit);
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|hit| hit.id.clone()).collect();
        let rows = self
            .warehouse
            .run_query(&select_by_ids_sql(
                &self.config.tickets_table,
                &self.config.ticket_id_column,
                &ids,
            ))
            .await?;

        let mut by_id: HashMap<String, CanonicalTicket> = rows
            .into_iter()
            .map(|row| normalize(row, SourceSchema::Warehouse))
            .map(|ticket| (ticket.id.clone(), ticket))
            .collect();

        Ok(hits
            .iter()
            .filter_map(|hit| {
                let mut ticket = by_id.remove(&hit.id)?;
                ticket
                    .extra
                    .insert("similarity".to_string(), json!(hit.similarity));
                Some(ticket)
            })
            .collect())
    }

    pub async fn documentation(&self, text: &str) -> Result<Vec<DocEntry>, ToolError> {
        let embedding = self.embed(text).await?;
        let rows = self
            .warehouse
            .vector_search(
                &self.config.docs_index,
                &embedding,
                self.config.document_limit,
            )
            .await?;

        let mut documents: Vec<DocEntry> = rows.iter().map(doc_from_row).collect();
        documents.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
        documents.truncate(self.config.document_limit);
        Ok(documents)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ToolError> {
        let embedding = self.embedder.embed(text).await?;
        if embedding.is_empty() {
            return Err(ToolError::EmptyEmbedding);
        }
        Ok(embedding)
    }
}

fn doc_from_row(row: &RawRecord) -> DocEntry {
    DocEntry {
        title: text_field(row, &["title", "page_title"]).unwrap_or_default(),
        content: text_field(row, &["content", "chunk", "text"]).unwrap_or_default(),
        notebook: text_field(row, &["notebook", "notebook_name"]).unwrap_or_default(),
        section: text_field(row, &["section", "section_name"]).unwrap_or_default(),
        similarity: number_field(row, &["search_score", "similarity", "score"]).unwrap_or(0.0),
    }
}

fn settle<T>(branch: &'static str, outcome: Result<Result<Vec<T>, ToolError>, Elapsed>) -> Vec<T> {
    match outcome {
        Ok(Ok(items)) => items,
        Ok(Err(err)) => {
            warn!(branch, error = %err, "evidence branch failed");
            Vec::new()
        }
        Err(_) => {
            warn!(branch, "evidence branch missed the deadline");
            Vec::new()
        }
    }
}

pub mod sql;

use async_trait::async_trait;
use desk_core::{RawRecord, TicketCategory, ToolError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketFilter {
    pub category: Option<TicketCategory>,
    pub support_group: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityHit {
    pub id: String,
    pub similarity: f64,
}

impl SimilarityHit {
    pub fn from_row(row: &RawRecord) -> Option<Self> {
        Some(Self {
            id: sql::text_field(row, &["id", "Id", "ticket_id"])?,
            similarity: sql::number_field(row, &["search_score", "similarity", "score"])
                .unwrap_or(0.0),
        })
    }
}

#[async_trait]
pub trait TicketingTool: Send + Sync {
    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<RawRecord>, ToolError>;
    async fn get_tickets_by_filter(&self, filter: &TicketFilter)
    -> Result<Vec<RawRecord>, ToolError>;
    async fn modify_ticket(&self, ticket_id: &str, fields: &RawRecord) -> Result<(), ToolError>;
}

#[async_trait]
pub trait WarehouseTool: Send + Sync {
    async fn run_query(&self, sql: &str) -> Result<Vec<RawRecord>, ToolError>;

    /// Nearest rows of a vector index, best match first, with the index's score column.
    async fn vector_search(
        &self,
        index: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RawRecord>, ToolError> {
        if embedding.is_empty() {
            return Err(ToolError::EmptyEmbedding);
        }
        self.run_query(&sql::vector_search_sql(index, embedding, limit))
            .await
    }

    async fn similarity_search(
        &self,
        index: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarityHit>, ToolError> {
        let rows = self.vector_search(index, embedding, limit).await?;
        Ok(rows.iter().filter_map(SimilarityHit::from_row).collect())
    }
}

#[async_trait]
pub trait EmbeddingTool: Send + Sync {
    /// An empty vector means the embedding failed.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ToolError>;
}

#[async_trait]
pub trait TextGenerationTool: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ToolError>;
}

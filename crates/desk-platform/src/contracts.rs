use chrono::{DateTime, Utc};
use desk_core::{CanonicalTicket, TicketAdvice};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketAdviceRequest {
    pub ticket_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketAdviceResponse {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub advice: TicketAdvice,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationTicketsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationTicketsResponse {
    pub count: usize,
    pub tickets: Vec<CanonicalTicket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementAssignmentRequest {
    pub ticket_id: String,
    pub support_group: String,
    pub priority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementAssignmentResponse {
    pub ticket_id: String,
    pub support_group: String,
    pub priority: String,
    pub status: String,
    pub applied_at: DateTime<Utc>,
}

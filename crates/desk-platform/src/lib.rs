pub mod athena;
pub mod config;
pub mod contracts;
pub mod databricks;
mod http;
pub mod serving;

pub use athena::AthenaTicketing;
pub use config::{AthenaConfig, DatabricksConfig, ServiceConfig};
pub use contracts::{
    ImplementAssignmentRequest, ImplementAssignmentResponse, TicketAdviceRequest,
    TicketAdviceResponse, ValidationTicketsQuery, ValidationTicketsResponse,
};
pub use databricks::{DatabricksWarehouse, TICKET_COLUMNS, prepare_statement};
pub use serving::{ChatCompletionClient, EmbeddingClient};

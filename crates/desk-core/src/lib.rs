pub mod error;
pub mod events;
pub mod models;
pub mod normalize;

pub use error::{AdviceError, ToolError};
pub use events::{AdviceEvent, AdviceStage};
pub use models::{
    CanonicalTicket, DocEntry, EvidenceBundle, Priority, RawRecord, RecommendationResult,
    SupportGroupEntry, TicketAdvice, TicketCategory,
};
pub use normalize::{
    SourceSchema, normalize, normalize_record, normalize_value, standard_fields, to_upstream,
};

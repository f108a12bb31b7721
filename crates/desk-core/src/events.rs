use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AdviceError;
use crate::models::TicketAdvice;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdviceStage {
    FetchingTicket = 1,
    LoadingCatalog = 2,
    GatheringEvidence = 3,
    RequestingRecommendation = 4,
    ResolvingLocation = 5,
}

impl AdviceStage {
    pub fn number(&self) -> u8 {
        *self as u8
    }
}

/// One step of a staged advice run. A run emits progress events in stage
/// order and ends with exactly one `Completed` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdviceEvent {
    Progress {
        stage: u8,
        message: String,
        emitted_at: DateTime<Utc>,
    },
    Completed {
        advice: Box<TicketAdvice>,
        emitted_at: DateTime<Utc>,
    },
    Failed {
        kind: String,
        message: String,
        emitted_at: DateTime<Utc>,
    },
}

impl AdviceEvent {
    pub fn progress(stage: AdviceStage, message: impl Into<String>) -> Self {
        Self::Progress {
            stage: stage.number(),
            message: message.into(),
            emitted_at: Utc::now(),
        }
    }

    pub fn completed(advice: TicketAdvice) -> Self {
        Self::Completed {
            advice: Box::new(advice),
            emitted_at: Utc::now(),
        }
    }

    pub fn failed(err: &AdviceError) -> Self {
        Self::Failed {
            kind: err.kind().to_string(),
            message: err.to_string(),
            emitted_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    /// Name used for the server-sent event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "complete",
            Self::Failed { .. } => "error",
        }
    }
}

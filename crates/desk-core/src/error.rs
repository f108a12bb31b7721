use thiserror::Error;

/// Failure raised by a collaborator client (ticketing, warehouse, embedding, generation).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
    #[error("warehouse query failed: {0}")]
    Query(String),
    #[error("embedding service returned an empty vector")]
    EmptyEmbedding,
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl ToolError {
    pub fn transport(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            service,
            message: err.to_string(),
        }
    }

    pub fn decode(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            service,
            message: err.to_string(),
        }
    }

    /// Everything except missing configuration may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotConfigured(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdviceError {
    #[error(transparent)]
    Transport(#[from] ToolError),
    #[error("malformed structured reply: {0}")]
    MalformedResponse(String),
    #[error("structured reply is missing or has invalid fields: {}", .missing.join(", "))]
    Validation { missing: Vec<String> },
    #[error("support group catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("ticket {0} not found")]
    NotFound(String),
    #[error("no recommendation after {attempts} attempt(s): {reason}")]
    RecommendationFailed { attempts: u32, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AdviceError {
    /// Stable identifier callers can branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Validation { .. } => "validation_error",
            Self::CatalogUnavailable(_) => "catalog_unavailable",
            Self::NotFound(_) => "not_found",
            Self::RecommendationFailed { .. } => "recommendation_failed",
            Self::Configuration(_) => "configuration_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            Self::MalformedResponse(_) | Self::Validation { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_configuration_is_permanent() {
        let rejected = ToolError::Status {
            service: "generation",
            status: 400,
            body: "bad request".to_string(),
        };
        assert!(rejected.is_retryable());
        assert!(AdviceError::Transport(rejected).is_retryable());
        assert!(!ToolError::NotConfigured("DATABRICKS_CHAT_URL").is_retryable());
        assert!(
            !AdviceError::Transport(ToolError::NotConfigured("DATABRICKS_CHAT_URL")).is_retryable()
        );
        assert!(!AdviceError::NotFound("IR1".into()).is_retryable());
    }

    #[test]
    fn validation_message_lists_missing_fields() {
        let err = AdviceError::Validation {
            missing: vec![
                "recommended_priority_level".to_string(),
                "detailed_explanation".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "structured reply is missing or has invalid fields: recommended_priority_level, detailed_explanation"
        );
        assert!(err.is_retryable());
        assert_eq!(AdviceError::NotFound("IR1".into()).kind(), "not_found");
    }
}

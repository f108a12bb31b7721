use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An upstream record as returned by a collaborator, keyed by its own field names.
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TicketCategory {
    #[serde(rename = "ir")]
    Incident,
    #[serde(rename = "sr")]
    ServiceRequest,
}

impl TicketCategory {
    /// "SR…" ids are service requests; every other id is handled as an incident.
    pub fn from_ticket_id(ticket_id: &str) -> Self {
        if ticket_id.trim().to_ascii_uppercase().starts_with("SR") {
            Self::ServiceRequest
        } else {
            Self::Incident
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Incident => "ir",
            Self::ServiceRequest => "sr",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CanonicalTicket {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    /// Upstream fields with no typed slot, kept under their (translated) names.
    #[serde(flatten)]
    pub extra: RawRecord,
}

impl CanonicalTicket {
    pub fn category(&self) -> TicketCategory {
        TicketCategory::from_ticket_id(&self.id)
    }

    /// Text used to embed the ticket for similarity and documentation search.
    pub fn search_text(&self) -> String {
        let title = self.title.as_deref().unwrap_or_default().trim();
        let description = self.description.as_deref().unwrap_or_default().trim();
        format!("{title} {description}").trim().to_string()
    }

    pub fn to_record(&self) -> RawRecord {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => RawRecord::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupportGroupEntry {
    pub name: String,
    #[serde(default, alias = "fullname")]
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "ticket_type")]
    pub category: TicketCategory,
}

impl SupportGroupEntry {
    pub fn is_assignable(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|description| !description.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocEntry {
    pub title: String,
    pub content: String,
    pub notebook: String,
    pub section: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvidenceBundle {
    pub similar_tickets: Vec<CanonicalTicket>,
    pub documentation: Vec<DocEntry>,
}

impl EvidenceBundle {
    pub fn is_empty(&self) -> bool {
        self.similar_tickets.is_empty() && self.documentation.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    pub support_group: String,
    pub priority: Priority,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub third_choice: Option<String>,
}

/// Everything produced for one advice request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketAdvice {
    pub ticket: CanonicalTicket,
    pub evidence: EvidenceBundle,
    pub recommendation: RecommendationResult,
    pub attempts: u32,
}

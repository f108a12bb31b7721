//! Instructions and serialized context sent to the text-generation service.

use desk_core::{CanonicalTicket, DocEntry, EvidenceBundle, SupportGroupEntry};
use desk_routing::CatalogPartition;
use serde::Serialize;
use serde_json::json;

/// Group the model is told to answer with when it cannot decide.
pub const UNCERTAIN_GROUP: &str = "Validation";

const MAX_DOCUMENT_CHARS: usize = 2_000;

const INSTRUCTIONS: &str = r#"You are an experienced IT service desk lead responsible for routing and prioritizing tickets across every technical domain.

You are given one open ticket, previously resolved tickets that look similar, knowledge base excerpts, and the support groups that may take the ticket. Recommend who should own it.

How to decide:
1. Identify the technical domain: hardware or software, network or application, and any vendor system involved.
2. Use the location. Location-specific groups serve the ticket's site and come first for hardware, printers, rooms and other on-site work. Global groups come first for application, system-wide and configuration work.
3. Check how the similar tickets were resolved and by whom.
4. Printer problems and single-workstation network problems go to end user support first. Department-wide network outages may go to a network group.
5. A ticket naming LGH may only go to a group with LGH in its name.
6. Problems that are not information technology at all (plumbing, furniture, fixtures, electrical) go to "facilities". Phones, printers and network cabling are information technology.
7. For end user support, answer with the parent group rather than a campus queue.

Priority:
- High: critical shared systems are down or patient care is affected.
- Medium: important, but a workaround exists.
- Low: everything else. This is the most common level.

Answer with a single JSON object and nothing else:
{
  "recommended_support_group": "exact `name` of a listed group, never its full name",
  "second_choice_support_group": "exact `name` of the next best group",
  "third_choice_support_group": "exact `name` of the third best group",
  "recommended_priority_level": "High, Medium or Low",
  "detailed_explanation": "the reasoning, citing groups, location and technical evidence"
}

If you are not confident, use "Validation" as the recommended group instead of guessing."#;

#[derive(Serialize)]
struct GroupLine<'a> {
    name: &'a str,
    fullname: &'a str,
    description: &'a str,
}

impl<'a> From<&'a SupportGroupEntry> for GroupLine<'a> {
    fn from(entry: &'a SupportGroupEntry) -> Self {
        Self {
            name: &entry.name,
            fullname: &entry.full_name,
            description: entry.description.as_deref().unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct DocumentLine<'a> {
    title: &'a str,
    notebook: &'a str,
    section: &'a str,
    similarity: f64,
    content: String,
}

impl<'a> From<&'a DocEntry> for DocumentLine<'a> {
    fn from(doc: &'a DocEntry) -> Self {
        Self {
            title: &doc.title,
            notebook: &doc.notebook,
            section: &doc.section,
            similarity: doc.similarity,
            content: truncate_chars(&doc.content, MAX_DOCUMENT_CHARS),
        }
    }
}

pub fn build_prompt(
    ticket: &CanonicalTicket,
    evidence: &EvidenceBundle,
    groups: &CatalogPartition,
) -> String {
    let documents: Vec<DocumentLine<'_>> =
        evidence.documentation.iter().map(DocumentLine::from).collect();
    let location_specific: Vec<GroupLine<'_>> =
        groups.location_specific.iter().map(GroupLine::from).collect();
    let global: Vec<GroupLine<'_>> = groups.global.iter().map(GroupLine::from).collect();

    let mut prompt = String::from(INSTRUCTIONS);
    push_section(&mut prompt, "TICKET", &json!(ticket));
    push_section(
        &mut prompt,
        "SIMILAR RESOLVED TICKETS",
        &json!(evidence.similar_tickets),
    );
    push_section(&mut prompt, "KNOWLEDGE BASE", &json!(documents));
    push_section(
        &mut prompt,
        "LOCATION-SPECIFIC SUPPORT GROUPS",
        &json!(location_specific),
    );
    push_section(&mut prompt, "GLOBAL SUPPORT GROUPS", &json!(global));
    prompt
}

fn push_section(prompt: &mut String, heading: &str, body: &serde_json::Value) {
    let rendered = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
    prompt.push_str("\n\n## ");
    prompt.push_str(heading);
    prompt.push('\n');
    prompt.push_str(&rendered);
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::TicketCategory;

    fn group(name: &str) -> SupportGroupEntry {
        SupportGroupEntry {
            name: name.to_string(),
            full_name: format!("EUS\\{name}"),
            description: Some(format!("{name} queue")),
            category: TicketCategory::Incident,
        }
    }

    #[test]
    fn prompt_carries_ticket_evidence_and_both_group_sections() {
        let ticket = CanonicalTicket {
            id: "IR10000001".to_string(),
            title: Some("Printer jam on 2nd floor".to_string()),
            location: Some("RITTENHOUSE - MAIN BLDG".to_string()),
            ..CanonicalTicket::default()
        };
        let evidence = EvidenceBundle {
            similar_tickets: vec![CanonicalTicket {
                id: "IR9".to_string(),
                support_group: Some("RITT - EUS".to_string()),
                ..CanonicalTicket::default()
            }],
            documentation: vec![DocEntry {
                title: "Printer triage".to_string(),
                content: "x".repeat(MAX_DOCUMENT_CHARS + 50),
                ..DocEntry::default()
            }],
        };
        let groups = CatalogPartition {
            location_specific: vec![group("RITT - EUS")],
            global: vec![group("Messaging")],
        };

        let prompt = build_prompt(&ticket, &evidence, &groups);

        assert!(prompt.starts_with(INSTRUCTIONS));
        assert!(prompt.contains("\"IR10000001\""));
        assert!(prompt.contains("\"IR9\""));
        let location_at = prompt.find("## LOCATION-SPECIFIC SUPPORT GROUPS").unwrap();
        let global_at = prompt.find("## GLOBAL SUPPORT GROUPS").unwrap();
        assert!(location_at < global_at);
        assert!(prompt[location_at..global_at].contains("RITT - EUS"));
        assert!(prompt[global_at..].contains("Messaging"));
        assert!(!prompt.contains(&"x".repeat(MAX_DOCUMENT_CHARS + 1)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}

//! Translation of upstream ticket records into the canonical vocabulary.
//!
//! The ticketing system speaks camelCase with separate id/value pairs
//! (`priority` / `priorityValue`), the warehouse table uses PascalCase
//! column names. Both are mapped onto one snake_case field set; keys
//! missing from a table are kept verbatim.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CanonicalTicket, RawRecord};

const TICKETING_FIELDS: &[(&str, &str)] = &[
    ("id", "id"),
    ("name", "ticket_number"),
    ("entityId", "entity_id"),
    ("entityType", "entity_type"),
    ("title", "title"),
    ("description", "description"),
    ("displayName", "display_name"),
    ("priority", "priority_level"),
    ("priorityValue", "priority"),
    ("status", "status_id"),
    ("statusValue", "status"),
    ("impact", "impact_id"),
    ("impactValue", "impact"),
    ("urgency", "urgency_id"),
    ("urgencyValue", "urgency"),
    ("createdDate", "created_at"),
    ("completedDate", "completed_at"),
    ("resolvedDate", "resolved_at"),
    ("closedDate", "closed_at"),
    ("lastModified", "last_modified_at"),
    ("location", "location_id"),
    ("locationValue", "location"),
    ("floor", "floor_id"),
    ("floorValue", "floor"),
    ("room", "room"),
    ("assignedTo_EntityId", "assigned_to_entity_id"),
    ("assignedTo_DisplayName", "assigned_to"),
    ("assignedTo_Department", "assigned_to_department"),
    ("assignedTo_Title", "assigned_to_title"),
    ("assignedTo_UserName", "assigned_to_username"),
    ("assignedTo_Company", "assigned_to_company"),
    ("affectedUser_EntityId", "affected_user_entity_id"),
    ("affectedUser_DisplayName", "affected_user"),
    ("affectedUser_Department", "affected_user_department"),
    ("affectedUser_Title", "affected_user_title"),
    ("affectedUser_UserName", "affected_user_username"),
    ("createdBy_DisplayName", "created_by"),
    ("createdBy_Department", "created_by_department"),
    ("createdBy_Title", "created_by_title"),
    ("source", "source_id"),
    ("sourceValue", "source"),
    ("supportGroup", "support_group_id"),
    ("supportGroupValue", "support_group"),
    ("tierQueue", "tier_queue"),
    ("contactMethod", "contact_method"),
    ("escalated", "escalated"),
    ("isParent", "is_parent"),
    ("classification", "classification_id"),
    ("classificationValue", "classification"),
    ("command_Center", "command_center_id"),
    ("command_CenterValue", "command_center"),
];

const WAREHOUSE_FIELDS: &[(&str, &str)] = &[
    ("Id", "id"),
    ("TicketType", "entity_type"),
    ("Title", "title"),
    ("Description", "description"),
    ("Status", "status"),
    ("Priority", "priority"),
    ("Impact", "impact"),
    ("Urgency", "urgency"),
    ("CreatedDate", "created_at"),
    ("ResolvedDate", "resolved_at"),
    ("LastModifiedDate", "last_modified_at"),
    ("Location", "location"),
    ("Floor", "floor"),
    ("Room", "room"),
    ("AssignedToUserName", "assigned_to"),
    ("AffectedUserName", "affected_user"),
    ("SupportGroup", "support_group"),
    ("Source", "source"),
    ("ResolutionCategory", "resolution_category"),
    ("ResolutionNotes", "resolution_notes"),
    ("Classification/Area", "classification"),
    ("Escalated", "escalated"),
    ("First_Call_Resolution", "first_call_resolution"),
    ("CommandCenter", "command_center"),
    ("ConfirmedResolution", "confirmed_resolution"),
    ("Increments", "increments"),
    ("FeedbackValue", "feedback_value"),
    ("Feedback_Notes", "feedback_notes"),
    ("Tags", "tags"),
    ("Specialty", "specialty"),
    ("Next_Steps", "next_steps"),
    ("User_Assign_Change", "user_assign_change"),
    ("Support_Group_Change", "support_group_change"),
];

/// Which upstream vocabulary produced a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceSchema {
    Ticketing,
    Warehouse,
    /// Already canonical; keys pass through untouched.
    Canonical,
}

impl SourceSchema {
    fn table(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Ticketing => TICKETING_FIELDS,
            Self::Warehouse => WAREHOUSE_FIELDS,
            Self::Canonical => &[],
        }
    }

    pub fn translate<'a>(&self, key: &'a str) -> &'a str {
        self.table()
            .iter()
            .find(|(upstream, _)| *upstream == key)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(key)
    }

    /// Inverse of `translate`, for writing canonical fields back upstream.
    pub fn upstream_name<'a>(&self, canonical: &'a str) -> &'a str {
        self.table()
            .iter()
            .find(|(_, name)| *name == canonical)
            .map(|(upstream, _)| *upstream)
            .unwrap_or(canonical)
    }
}

pub fn to_upstream(record: RawRecord, schema: SourceSchema) -> RawRecord {
    record
        .into_iter()
        .map(|(key, value)| (schema.upstream_name(&key).to_string(), value))
        .collect()
}

/// Canonical names produced by either translation table.
pub fn standard_fields() -> BTreeSet<&'static str> {
    TICKETING_FIELDS
        .iter()
        .chain(WAREHOUSE_FIELDS)
        .map(|(_, canonical)| *canonical)
        .collect()
}

/// Renames keys of every object inside `value`, at any depth.
pub fn normalize_value(value: Value, schema: SourceSchema) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_record(map, schema)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| normalize_value(item, schema))
                .collect(),
        ),
        other => other,
    }
}

pub fn normalize_record(raw: RawRecord, schema: SourceSchema) -> RawRecord {
    raw.into_iter()
        .map(|(key, value)| {
            let value = normalize_value(value, schema);
            (schema.translate(&key).to_string(), value)
        })
        .collect()
}

pub fn normalize(raw: RawRecord, schema: SourceSchema) -> CanonicalTicket {
    let mut record = normalize_record(raw, schema);

    let id = match record.remove("id") {
        Some(value) => scalar_text(&value).unwrap_or_else(|| value.to_string()),
        None => record
            .get("ticket_number")
            .and_then(scalar_text)
            .unwrap_or_default(),
    };

    CanonicalTicket {
        id,
        title: take_text(&mut record, "title"),
        description: take_text(&mut record, "description"),
        status: take_text(&mut record, "status"),
        priority: take_text(&mut record, "priority"),
        location: take_text(&mut record, "location"),
        floor: take_text(&mut record, "floor"),
        assigned_to: take_text(&mut record, "assigned_to"),
        affected_user: take_text(&mut record, "affected_user"),
        source: take_text(&mut record, "source"),
        support_group: take_text(&mut record, "support_group"),
        resolution_notes: take_text(&mut record, "resolution_notes"),
        created_at: take_text(&mut record, "created_at"),
        resolved_at: take_text(&mut record, "resolved_at"),
        extra: record,
    }
}

/// Moves a scalar out of the record. Structured values stay in place.
fn take_text(record: &mut RawRecord, key: &str) -> Option<String> {
    match record.get(key) {
        Some(Value::Object(_)) | Some(Value::Array(_)) | None => None,
        Some(_) => record.remove(key).as_ref().and_then(scalar_text),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn canonical_fields_map_back_to_ticketing_names() {
        let fields = record(json!({
            "support_group": "RITT - EUS",
            "priority": "Low",
            "custom_note": "kept"
        }));
        let upstream = to_upstream(fields, SourceSchema::Ticketing);
        assert_eq!(upstream["supportGroupValue"], json!("RITT - EUS"));
        assert_eq!(upstream["priorityValue"], json!("Low"));
        assert_eq!(upstream["custom_note"], json!("kept"));
    }

    #[test]
    fn warehouse_row_maps_to_canonical_fields() {
        let ticket = normalize(
            record(json!({
                "Id": "IR4964858",
                "Title": "Printer offline",
                "Description": "Front desk printer shows offline",
                "Location": "RITTENHOUSE - MAIN BLDG (1800 LOMBARD)",
                "SupportGroup": "RITT - EUS",
                "ResolutionNotes": "Power cycled",
                "Classification/Area": "Hardware",
                "Room": "204"
            })),
            SourceSchema::Warehouse,
        );

        assert_eq!(ticket.id, "IR4964858");
        assert_eq!(ticket.title.as_deref(), Some("Printer offline"));
        assert_eq!(
            ticket.location.as_deref(),
            Some("RITTENHOUSE - MAIN BLDG (1800 LOMBARD)")
        );
        assert_eq!(ticket.support_group.as_deref(), Some("RITT - EUS"));
        assert_eq!(ticket.resolution_notes.as_deref(), Some("Power cycled"));
        assert_eq!(ticket.extra.get("classification"), Some(&json!("Hardware")));
        assert_eq!(ticket.extra.get("room"), Some(&json!("204")));
    }

    #[test]
    fn ticketing_record_prefers_value_fields() {
        let ticket = normalize(
            record(json!({
                "id": "IR10000001",
                "priority": 2,
                "priorityValue": "Medium",
                "location": "c0ffee",
                "locationValue": "HUP - SILVERSTEIN",
                "assignedTo_DisplayName": "Jane Analyst",
                "createdDate": "2025-01-04T10:00:00Z"
            })),
            SourceSchema::Ticketing,
        );

        assert_eq!(ticket.priority.as_deref(), Some("Medium"));
        assert_eq!(ticket.location.as_deref(), Some("HUP - SILVERSTEIN"));
        assert_eq!(ticket.assigned_to.as_deref(), Some("Jane Analyst"));
        assert_eq!(ticket.created_at.as_deref(), Some("2025-01-04T10:00:00Z"));
        assert_eq!(ticket.extra.get("priority_level"), Some(&json!(2)));
        assert_eq!(ticket.extra.get("location_id"), Some(&json!("c0ffee")));
    }

    #[test]
    fn unknown_keys_and_nested_objects_are_preserved() {
        let ticket = normalize(
            record(json!({
                "id": "SR1",
                "customField": true,
                "affectedUser": {
                    "displayName": "Pat Doe",
                    "title": "Nurse",
                    "company": "HUP"
                },
                "history": [{ "statusValue": "Open" }]
            })),
            SourceSchema::Ticketing,
        );

        assert_eq!(ticket.extra.get("customField"), Some(&json!(true)));
        assert_eq!(
            ticket.extra.get("affectedUser"),
            Some(&json!({
                "display_name": "Pat Doe",
                "title": "Nurse",
                "company": "HUP"
            }))
        );
        assert_eq!(
            ticket.extra.get("history"),
            Some(&json!([{ "status": "Open" }]))
        );
    }

    #[test]
    fn ticket_number_backs_up_missing_id() {
        let ticket = normalize(
            record(json!({ "name": "IR777", "title": "VPN" })),
            SourceSchema::Ticketing,
        );
        assert_eq!(ticket.id, "IR777");
        assert_eq!(ticket.extra.get("ticket_number"), Some(&json!("IR777")));
    }

    #[test]
    fn structured_value_under_canonical_name_stays_in_extra() {
        let ticket = normalize(
            record(json!({ "Id": "IR5", "Location": { "site": "PAH" } })),
            SourceSchema::Warehouse,
        );
        assert_eq!(ticket.location, None);
        assert_eq!(ticket.extra.get("location"), Some(&json!({ "site": "PAH" })));
    }

    #[test]
    fn canonical_pass_through_is_idempotent() {
        let fixtures = [
            (
                record(json!({
                    "Id": "IR4964858",
                    "Title": "Monitor flicker",
                    "Priority": "Low",
                    "Escalated": false,
                    "Tags": ["display", "hardware"],
                    "Location": { "campus": "PAH" }
                })),
                SourceSchema::Warehouse,
            ),
            (
                record(json!({
                    "name": "SR9",
                    "statusValue": "Open",
                    "affectedUser": { "displayName": "Pat" },
                    "unmapped": 1.5
                })),
                SourceSchema::Ticketing,
            ),
        ];

        for (raw, schema) in fixtures {
            let first = normalize(raw, schema);
            let second = normalize(first.to_record(), SourceSchema::Canonical);
            assert_eq!(first, second);
            let third = normalize(second.to_record(), SourceSchema::Canonical);
            assert_eq!(second.to_record(), third.to_record());
        }
    }

    #[test]
    fn standard_fields_cover_both_tables() {
        let fields = standard_fields();
        assert!(fields.contains("ticket_number"));
        assert!(fields.contains("resolution_notes"));
        assert!(fields.contains("support_group"));
        assert!(!fields.contains("Id"));
    }
}

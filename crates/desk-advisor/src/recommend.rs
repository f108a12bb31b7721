use desk_core::{
    AdviceError, CanonicalTicket, EvidenceBundle, Priority, RecommendationResult,
    SupportGroupEntry,
};
use desk_routing::{LocationResolver, RoutingHints, match_support_groups};
use desk_tools::TextGenerationTool;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::prompt::{UNCERTAIN_GROUP, build_prompt};
use crate::retry::{RetryPolicy, retry_with_validation};

const SUPPORT_GROUP_KEY: &str = "recommended_support_group";
const PRIORITY_KEY: &str = "recommended_priority_level";
const EXPLANATION_KEY: &str = "detailed_explanation";
const SECOND_CHOICE_KEY: &str = "second_choice_support_group";
const THIRD_CHOICE_KEY: &str = "third_choice_support_group";

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationOutcome {
    pub result: RecommendationResult,
    pub attempts: u32,
    /// Set when a generic group answer was replaced by its site branch.
    pub resolved_from: Option<String>,
}

pub struct RecommendationRequester<G> {
    generator: G,
    policy: RetryPolicy,
    resolver: LocationResolver,
    exclude_keywords: Vec<String>,
}

impl<G> RecommendationRequester<G>
where
    G: TextGenerationTool,
{
    pub fn new(generator: G, policy: RetryPolicy, resolver: LocationResolver) -> Self {
        Self {
            generator,
            policy,
            resolver,
            exclude_keywords: Vec::new(),
        }
    }

    /// Global groups whose name contains any of these are never offered.
    pub fn with_exclude_keywords(mut self, keywords: Vec<String>) -> Self {
        self.exclude_keywords = keywords;
        self
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    #[instrument(skip_all, fields(ticket_id = %ticket.id))]
    pub async fn recommend(
        &self,
        ticket: &CanonicalTicket,
        evidence: &EvidenceBundle,
        catalog: &[SupportGroupEntry],
        hints: &RoutingHints,
    ) -> Result<RecommendationOutcome, AdviceError> {
        let location = ticket.location.as_deref().unwrap_or_default();
        let groups = match_support_groups(catalog, ticket, hints, &self.exclude_keywords);
        let rendered = build_prompt(ticket, evidence, &groups);
        let prompt = rendered.as_str();

        let accepted = retry_with_validation(
            &self.policy,
            move |attempt| async move {
                info!(attempt, "requesting recommendation");
                self.generator
                    .complete(prompt)
                    .await
                    .map_err(AdviceError::from)
            },
            |reply: String| parse_reply(&reply),
        )
        .await
        .map_err(|exhausted| {
            warn!(
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "recommendation failed"
            );
            AdviceError::RecommendationFailed {
                attempts: exhausted.attempts,
                reason: exhausted.last_error.to_string(),
            }
        })?;

        let mut result = accepted.value;
        let mut resolved_from = None;
        if self.resolver.is_generic(&result.support_group) {
            let candidates = self
                .resolver
                .generic_variants(catalog.iter().map(|entry| entry.name.as_str()));
            let resolved = self.resolver.resolve(location, &candidates);
            if resolved != result.support_group {
                resolved_from = Some(std::mem::replace(&mut result.support_group, resolved));
            }
        } else if result.support_group.eq_ignore_ascii_case(UNCERTAIN_GROUP) {
            info!("model deferred the ticket to the validation queue");
        }

        info!(
            attempts = accepted.attempts,
            support_group = %result.support_group,
            priority = %result.priority,
            "recommendation accepted"
        );
        Ok(RecommendationOutcome {
            result,
            attempts: accepted.attempts,
            resolved_from,
        })
    }
}

/// Removes a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fence(reply: &str) -> &str {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.split_once('\n') {
            Some((_tag, body)) => body,
            None => rest.trim_start_matches("json"),
        };
    }
    if let Some(body) = text.trim_end().strip_suffix("```") {
        text = body;
    }
    text.trim()
}

/// Parses and validates one structured reply from the text-generation service.
pub fn parse_reply(reply: &str) -> Result<RecommendationResult, AdviceError> {
    let value: Value = serde_json::from_str(strip_code_fence(reply))
        .map_err(|err| AdviceError::MalformedResponse(err.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(AdviceError::MalformedResponse(
            "expected a JSON object".to_string(),
        ));
    };

    let support_group = required_text(&fields, SUPPORT_GROUP_KEY);
    let explanation = required_text(&fields, EXPLANATION_KEY);
    let priority = required_text(&fields, PRIORITY_KEY).and_then(Priority::parse);

    match (support_group, priority, explanation) {
        (Some(support_group), Some(priority), Some(explanation)) => Ok(RecommendationResult {
            support_group: support_group.to_string(),
            priority,
            explanation: explanation.to_string(),
            second_choice: required_text(&fields, SECOND_CHOICE_KEY).map(str::to_string),
            third_choice: required_text(&fields, THIRD_CHOICE_KEY).map(str::to_string),
        }),
        (support_group, priority, explanation) => {
            let missing = [
                (SUPPORT_GROUP_KEY, support_group.is_none()),
                (PRIORITY_KEY, priority.is_none()),
                (EXPLANATION_KEY, explanation.is_none()),
            ]
            .into_iter()
            .filter(|(_, absent)| *absent)
            .map(|(key, _)| key.to_string())
            .collect();
            Err(AdviceError::Validation { missing })
        }
    }
}

fn required_text<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

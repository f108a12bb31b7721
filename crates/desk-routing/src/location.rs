//! Refines a generic, location-agnostic support group to the branch serving
//! the ticket's site.
//!
//! The rule tables below define the behaviour; scoring ties go to the
//! candidate supplied first.

use tracing::debug;

pub const DEFAULT_GENERIC_GROUP: &str = "EUS";

const LOCATION_SEPARATORS: [&str; 9] = [
    " - ", " (", "(", " MAIN ", " CENTER", " HOSPITAL", " MEDICAL", " BUILDING", " BLDG",
];

/// Full names match anywhere; short abbreviations only as whole words.
const CAMPUS_NAMES: [&str; 17] = [
    "RITTENHOUSE",
    "PRESBYTERIAN",
    "PENNSYLVANIA HOSPITAL",
    "CHESTER COUNTY",
    "LANCASTER",
    "PRINCETON",
    "CHERRY HILL",
    "RADNOR",
    "VALLEY FORGE",
    "HUP",
    "PAH",
    "PMUC",
    "CCH",
    "LGH",
    "RSI",
    "RITT",
    "PPMC",
];

const SHORT_CAMPUS_NAME_LEN: usize = 4;

/// Groups that never serve end users at a site.
const EXCLUDED_KEYWORDS: [&str; 6] = [
    "NETWORK", "ASSET", "TAGGING", "WIRELESS", "TELECOM", "CABLING",
];

/// (site name fragment, group-name abbreviation)
const ABBREVIATIONS: [(&str, &str); 9] = [
    ("RITTENHOUSE", "RITT"),
    ("PRESBYTERIAN", "PPMC"),
    ("PENNSYLVANIA", "PAH"),
    ("CHESTER", "CCH"),
    ("LANCASTER", "LGH"),
    ("PRINCETON", "PMC"),
    ("CHERRY", "RSI"),
    ("RADNOR", "RSI"),
    ("MARKET", "PMUC"),
];

const SUBSTRING_SCORE: u32 = 3;
const WHOLE_WORD_SCORE: u32 = 2;
const PREFIX_SCORE: u32 = 1;
const ABBREVIATION_SCORE: u32 = 3;
const MIN_PREFIX_WORD_LEN: usize = 3;
const MIN_FALLBACK_WORD_LEN: usize = 4;

#[derive(Debug, Clone)]
pub struct LocationResolver {
    generic_group: String,
}

impl Default for LocationResolver {
    fn default() -> Self {
        Self::new(DEFAULT_GENERIC_GROUP)
    }
}

impl LocationResolver {
    pub fn new(generic_group: impl Into<String>) -> Self {
        Self {
            generic_group: generic_group.into(),
        }
    }

    pub fn generic_group(&self) -> &str {
        &self.generic_group
    }

    pub fn is_generic(&self, group: &str) -> bool {
        group.trim().eq_ignore_ascii_case(&self.generic_group)
    }

    /// Catalog names that are branches of the generic group, e.g. "RITT - EUS" for "EUS".
    pub fn generic_variants<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        let generic = self.generic_group.trim().to_uppercase();
        names
            .into_iter()
            .filter(|name| contains_word(&name.to_uppercase(), &generic))
            .collect()
    }

    /// Best location-specific candidate, or the generic group when nothing scores.
    pub fn resolve<S: AsRef<str>>(&self, location_text: &str, candidates: &[S]) -> String {
        let Some(token) = extract_location_token(location_text) else {
            debug!(location = location_text, "no location token; keeping generic group");
            return self.generic_group.clone();
        };

        let mut best: Option<(&str, u32)> = None;
        for candidate in candidates {
            let name = candidate.as_ref();
            if is_excluded(name) {
                continue;
            }
            let score = score_candidate(&token, name);
            if score > 0 && best.is_none_or(|(_, top)| score > top) {
                best = Some((name, score));
            }
        }

        match best {
            Some((name, score)) => {
                debug!(token = %token, group = name, score, "resolved generic group by location");
                name.to_string()
            }
            None => {
                debug!(token = %token, "no candidate matched location");
                self.generic_group.clone()
            }
        }
    }
}

pub fn extract_location_token(location_text: &str) -> Option<String> {
    let upper = location_text.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }

    if let Some(head) = LOCATION_SEPARATORS
        .iter()
        .find_map(|separator| upper.split_once(*separator).map(|(head, _)| head.trim()))
    {
        if head.chars().count() > 2 {
            return Some(head.to_string());
        }
    }

    let campus = CAMPUS_NAMES.iter().find(|campus| {
        if campus.len() <= SHORT_CAMPUS_NAME_LEN {
            contains_word(&upper, campus)
        } else {
            upper.contains(**campus)
        }
    });
    if let Some(campus) = campus {
        return Some((*campus).to_string());
    }

    upper
        .split_whitespace()
        .take(3)
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .find(|word| word.chars().count() >= MIN_FALLBACK_WORD_LEN)
}

pub fn score_candidate(token: &str, candidate: &str) -> u32 {
    let token = token.to_uppercase();
    let name = candidate.to_uppercase();
    let mut score = 0;

    if name.contains(&token) {
        score += SUBSTRING_SCORE;
        if contains_word(&name, &token) {
            score += WHOLE_WORD_SCORE;
        }
    }

    if words(&name).any(|word| {
        word.len() >= MIN_PREFIX_WORD_LEN && (token.starts_with(word) || word.starts_with(&token))
    }) {
        score += PREFIX_SCORE;
    }

    let abbreviated = ABBREVIATIONS.iter().any(|(site, short)| {
        (token.contains(site) && contains_word(&name, short))
            || (contains_word(&token, short) && name.contains(site))
    });
    if abbreviated {
        score += ABBREVIATION_SCORE;
    }

    score
}

pub(crate) fn is_excluded(candidate: &str) -> bool {
    let name = candidate.to_uppercase();
    EXCLUDED_KEYWORDS.iter().any(|keyword| name.contains(keyword))
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, matched)| {
        let end = start + matched.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

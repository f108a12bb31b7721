pub mod evidence;
pub mod orchestrator;
pub mod prompt;
pub mod recommend;
pub mod retry;

pub use evidence::{EvidenceConfig, EvidenceGatherer};
pub use orchestrator::{AdviceOrchestrator, AdviceService, AdvisorConfig};
pub use prompt::{UNCERTAIN_GROUP, build_prompt};
pub use recommend::{RecommendationOutcome, RecommendationRequester, parse_reply, strip_code_fence};
pub use retry::{Attempted, RetryExhausted, RetryPolicy, retry_with_validation};

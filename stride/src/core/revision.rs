//! Revision controller: decides whether a reviewed task loops or advances.

use crate::core::state::{MAX_REVISIONS, PipelineState};
use crate::core::types::ReviewVerdict;

/// Next step after a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionDecision {
    LoopToGenerate,
    Advance,
}

/// Fold a review verdict into the state.
///
/// Once the revision budget is spent, `needs_revision` is forced false no
/// matter what the reviewer said.
pub fn record_verdict(state: &mut PipelineState, verdict: &ReviewVerdict) {
    state.needs_revision = verdict.requests_revision() && state.revision_count < MAX_REVISIONS;
    state.last_review_comment = verdict.comment.clone();
}

pub fn should_revise(state: &PipelineState) -> RevisionDecision {
    if state.needs_revision && state.revision_count < MAX_REVISIONS {
        RevisionDecision::LoopToGenerate
    } else {
        RevisionDecision::Advance
    }
}

/// Count one more revision before regenerating.
pub fn begin_revision(state: &mut PipelineState) {
    state.revision_count = (state.revision_count + 1).min(MAX_REVISIONS);
}

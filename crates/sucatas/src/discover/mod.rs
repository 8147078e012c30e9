//! Source discoverers: enumerate candidate notices for a run.

pub mod pncp;
pub mod sitemap;

use serde_json::Value;
use sucatas_protocol::CandidateNotice;

/// A discovered candidate plus whatever payload discovery already has.
/// Keeping the search payload avoids a details round-trip when it is
/// already complete.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub notice: CandidateNotice,
    pub payload: Option<Value>,
}

/// Most recently modified first; unknown lastmod sinks to the end.
pub fn sort_most_recent_first(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| match (b.notice.lastmod, a.notice.lastmod) {
        (Some(b_time), Some(a_time)) => b_time.cmp(&a_time),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

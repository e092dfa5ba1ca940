//! Priority scoring for queued requests.
//!
//! Scores are additive with no normalization. Baseline is zero; ties are
//! broken by arrival order in the queue, not here.

use axum::http::Request;

use crate::config::PriorityConfig;
use crate::http::request::{Principal, Role};

#[derive(Debug, Clone, Default)]
pub struct PriorityPolicy {
    config: PriorityConfig,
}

impl PriorityPolicy {
    pub fn new(config: PriorityConfig) -> Self {
        Self { config }
    }

    pub fn score<B>(&self, request: &Request<B>) -> i32 {
        let c = &self.config;
        let mut score = 0;

        if let Some(principal) = request.extensions().get::<Principal>() {
            score += c.authenticated_bonus;
            if principal.role == Role::Admin {
                score += c.admin_bonus;
            }
        }

        let path = request.uri().path();
        if c.high_priority_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            score += c.high_priority_bonus;
        }
        if !c.upload_marker.is_empty() && path.contains(c.upload_marker.as_str()) {
            score += c.upload_penalty;
        }
        if !c.search_marker.is_empty() && path.contains(c.search_marker.as_str()) {
            score += c.search_penalty;
        }

        score
    }
}

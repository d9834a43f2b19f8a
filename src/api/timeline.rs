//! Per-feature timeline for Gantt display.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backlog::Backlog;
use crate::logging::SessionRecord;

#[derive(Debug, Clone, Serialize)]
pub struct TimelineSegment {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineFeature {
    pub feature_id: String,
    pub name: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sessions: Vec<TimelineSegment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineResponse {
    pub features: Vec<TimelineFeature>,
}

pub fn compute_timeline(backlog: &Backlog, sessions: &[SessionRecord]) -> TimelineResponse {
    let features = backlog
        .features
        .iter()
        .map(|feature| {
            let mut segments: Vec<TimelineSegment> = sessions
                .iter()
                .filter(|s| s.feature_id.as_deref() == Some(feature.id.as_str()))
                .map(|s| TimelineSegment {
                    session_id: s.session_id.clone(),
                    started_at: s.started_at,
                    ended_at: s.ended_at,
                    outcome: s.outcome.label().to_string(),
                })
                .collect();
            segments.sort_by_key(|s| s.started_at);

            TimelineFeature {
                feature_id: feature.id.clone(),
                name: feature.name.clone(),
                status: feature.status.label().to_string(),
                started_at: feature.started_at,
                completed_at: feature.completed_at,
                sessions: segments,
            }
        })
        .collect();

    TimelineResponse { features }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::Feature;
    use crate::cost::UsageTotals;
    use crate::session::{AgentKind, SessionOutcome};

    #[test]
    fn test_timeline_groups_sessions_by_feature() {
        let mut backlog = Backlog::new("p", "/p");
        backlog.features.push(Feature::new("a", "A"));
        backlog.features.push(Feature::new("b", "B"));

        let base = Utc::now();
        let mk = |id: &str, feature: &str, offset_min: i64| SessionRecord {
            session_id: id.to_string(),
            file: "f.jsonl".to_string(),
            agent_kind: AgentKind::Coding,
            feature_id: Some(feature.to_string()),
            model: "m".to_string(),
            started_at: base + chrono::Duration::minutes(offset_min),
            ended_at: base + chrono::Duration::minutes(offset_min + 5),
            outcome: SessionOutcome::Handoff,
            turns: 1,
            usage: UsageTotals::default(),
            cost_usd: 0.0,
            files_changed: vec![],
            commit: None,
            error: None,
            verification: None,
            handoff_notes: None,
        };
        // Out of order on purpose.
        let sessions = vec![mk("s2", "a", 10), mk("s1", "a", 0), mk("s3", "b", 5)];

        let timeline = compute_timeline(&backlog, &sessions);
        assert_eq!(timeline.features.len(), 2);
        let a = &timeline.features[0];
        assert_eq!(a.sessions.len(), 2);
        assert_eq!(a.sessions[0].session_id, "s1");
        assert_eq!(a.sessions[1].session_id, "s2");
        assert_eq!(timeline.features[1].sessions.len(), 1);
    }
}

use chrono::{DateTime, Utc};
use kubeagent_core::AgentType;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution counters for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Agent these counters belong to.
    pub agent_type: AgentType,
    /// Tasks that finished successfully.
    pub tasks_completed: u64,
    /// Tasks that failed.
    pub tasks_failed: u64,
    /// Summed wall-clock time of all recorded executions.
    pub total_duration_ms: u64,
    /// `total_duration_ms / (tasks_completed + tasks_failed)`.
    pub average_duration_ms: u64,
    /// Time of the most recent record.
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    /// Zeroed counters.
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            tasks_completed: 0,
            tasks_failed: 0,
            total_duration_ms: 0,
            average_duration_ms: 0,
            last_executed_at: None,
        }
    }

    /// Completed plus failed.
    pub fn total_tasks(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }

    /// Fraction of recorded runs that succeeded, 0.0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        match self.total_tasks() {
            0 => 0.0,
            n => self.tasks_completed as f64 / n as f64,
        }
    }
}

/// Thread-safe accumulator for [`AgentMetrics`].
#[derive(Debug)]
pub struct MetricsTracker {
    inner: Mutex<AgentMetrics>,
}

impl MetricsTracker {
    /// Tracker with zeroed counters.
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            inner: Mutex::new(AgentMetrics::new(agent_type)),
        }
    }

    /// Record one run and recompute the average.
    pub fn record(&self, duration: Duration, success: bool) {
        let mut m = self.inner.lock();
        if success {
            m.tasks_completed += 1;
        } else {
            m.tasks_failed += 1;
        }
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        m.total_duration_ms = m.total_duration_ms.saturating_add(ms);
        let total = m.total_tasks();
        if total > 0 {
            m.average_duration_ms = m.total_duration_ms / total;
        }
        m.last_executed_at = Some(Utc::now());
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> AgentMetrics {
        self.inner.lock().clone()
    }

    /// Serialize the current counters as JSON (for dashboards).
    pub fn to_json(&self) -> serde_json::Value {
        let m = self.snapshot();
        serde_json::json!({
            "agent_type": m.agent_type,
            "tasks_completed": m.tasks_completed,
            "tasks_failed": m.tasks_failed,
            "total_duration_ms": m.total_duration_ms,
            "average_duration_ms": m.average_duration_ms,
            "success_rate": m.success_rate(),
            "last_executed_at": m.last_executed_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_average_over_completed_and_failed() {
        let tracker = MetricsTracker::new(AgentType::Diagnostician);
        tracker.record(Duration::from_millis(100), true);
        tracker.record(Duration::from_millis(300), false);
        let m = tracker.snapshot();
        assert_eq!(m.tasks_completed, 1);
        assert_eq!(m.tasks_failed, 1);
        assert_eq!(m.total_duration_ms, 400);
        assert_eq!(m.average_duration_ms, 200);
        assert!((m.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_last_executed_updates_on_every_record() {
        let tracker = MetricsTracker::new(AgentType::Remediator);
        assert!(tracker.snapshot().last_executed_at.is_none());
        tracker.record(Duration::ZERO, false);
        let first = tracker.snapshot().last_executed_at.unwrap();
        tracker.record(Duration::ZERO, true);
        assert!(tracker.snapshot().last_executed_at.unwrap() >= first);
    }

    #[test]
    fn test_to_json_shape() {
        let tracker = MetricsTracker::new(AgentType::Coordinator);
        tracker.record(Duration::from_millis(50), true);
        let json = tracker.to_json();
        assert_eq!(json["agent_type"], "coordinator");
        assert_eq!(json["tasks_completed"], 1);
        assert_eq!(json["success_rate"], 1.0);
    }
}

//! Probe events - the lifecycle notifications of the work manager.

use serde::{Deserialize, Serialize};

/// A lifecycle notification for one work unit.
///
/// Serialized with the event name in `event` and camelCase payload keys,
/// e.g. `{"event":"workWaitedFor","raName":"my-ra","elapsedTime":12}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProbeEvent {
    /// Unit accepted by the work manager
    #[serde(rename_all = "camelCase")]
    WorkSubmitted {
        /// Submitting resource adapter
        ra_name: String,
    },

    /// Unit placed on the queue
    #[serde(rename_all = "camelCase")]
    WorkQueued {
        /// Submitting resource adapter
        ra_name: String,
    },

    /// Time in milliseconds the unit spent queued before dequeue
    #[serde(rename_all = "camelCase")]
    WorkWaitedFor {
        /// Submitting resource adapter
        ra_name: String,
        /// Milliseconds spent on the queue
        elapsed_time: u64,
    },

    /// Unit removed from the queue
    #[serde(rename_all = "camelCase")]
    WorkDequeued {
        /// Submitting resource adapter
        ra_name: String,
    },

    /// Execution begins on a worker
    #[serde(rename_all = "camelCase")]
    WorkProcessingStarted {
        /// Submitting resource adapter
        ra_name: String,
    },

    /// Execution ends, successfully or not
    #[serde(rename_all = "camelCase")]
    WorkProcessingCompleted {
        /// Submitting resource adapter
        ra_name: String,
    },

    /// Unit completed
    #[serde(rename_all = "camelCase")]
    WorkProcessed {
        /// Submitting resource adapter
        ra_name: String,
    },

    /// Unit rejected or timed out before it started
    #[serde(rename_all = "camelCase")]
    WorkTimedOut {
        /// Submitting resource adapter
        ra_name: String,
    },
}

impl ProbeEvent {
    /// Resource adapter the event belongs to.
    pub fn ra_name(&self) -> &str {
        match self {
            Self::WorkSubmitted { ra_name }
            | Self::WorkQueued { ra_name }
            | Self::WorkWaitedFor { ra_name, .. }
            | Self::WorkDequeued { ra_name }
            | Self::WorkProcessingStarted { ra_name }
            | Self::WorkProcessingCompleted { ra_name }
            | Self::WorkProcessed { ra_name }
            | Self::WorkTimedOut { ra_name } => ra_name,
        }
    }

    /// Probe name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkSubmitted { .. } => "workSubmitted",
            Self::WorkQueued { .. } => "workQueued",
            Self::WorkWaitedFor { .. } => "workWaitedFor",
            Self::WorkDequeued { .. } => "workDequeued",
            Self::WorkProcessingStarted { .. } => "workProcessingStarted",
            Self::WorkProcessingCompleted { .. } => "workProcessingCompleted",
            Self::WorkProcessed { .. } => "workProcessed",
            Self::WorkTimedOut { .. } => "workTimedOut",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waited_for_json_shape() {
        let event = ProbeEvent::WorkWaitedFor {
            ra_name: "my-ra".to_string(),
            elapsed_time: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "workWaitedFor", "raName": "my-ra", "elapsedTime": 12})
        );
    }

    #[test]
    fn test_serialized_tag_matches_name() {
        let events = vec![
            ProbeEvent::WorkSubmitted { ra_name: "a".into() },
            ProbeEvent::WorkQueued { ra_name: "a".into() },
            ProbeEvent::WorkDequeued { ra_name: "a".into() },
            ProbeEvent::WorkProcessingStarted { ra_name: "a".into() },
            ProbeEvent::WorkProcessingCompleted { ra_name: "a".into() },
            ProbeEvent::WorkProcessed { ra_name: "a".into() },
            ProbeEvent::WorkTimedOut { ra_name: "a".into() },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
            assert_eq!(json["raName"], "a");
            assert_eq!(event.ra_name(), "a");
        }
    }
}

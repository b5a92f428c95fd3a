use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::recommendation::RecommendationId;
use crate::constants::SYSTEM_CONTROLLER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Accepted,
    Overridden,
    /// Recorded by the core when a recommendation outlives its conflict
    Expired,
}

/// A terminal decision on a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub recommendation_id: RecommendationId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub timestamp: NaiveDateTime,
    pub controller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Action {
    #[must_use]
    pub fn accepted(recommendation_id: RecommendationId, controller_id: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            recommendation_id,
            action_type: ActionType::Accepted,
            timestamp,
            controller_id: controller_id.to_string(),
            reason: None,
        }
    }

    #[must_use]
    pub fn overridden(
        recommendation_id: RecommendationId,
        controller_id: &str,
        reason: &str,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recommendation_id,
            action_type: ActionType::Overridden,
            timestamp,
            controller_id: controller_id.to_string(),
            reason: Some(reason.to_string()),
        }
    }

    #[must_use]
    pub fn expired(recommendation_id: RecommendationId, reason: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            recommendation_id,
            action_type: ActionType::Expired,
            timestamp,
            controller_id: SYSTEM_CONTROLLER.to_string(),
            reason: Some(reason.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BASE_DATE;

    #[test]
    fn test_action_json_uses_type_field() {
        let at = BASE_DATE.and_hms_opt(9, 0, 0).expect("valid time");
        let action = Action::overridden(Uuid::new_v4(), "controller-1", "Emergency train priority", at);
        let json = serde_json::to_value(&action).expect("serializable");
        assert_eq!(json["type"], "overridden");
        assert_eq!(json["reason"], "Emergency train priority");

        let back: Action = serde_json::from_value(json).expect("deserializable");
        assert_eq!(back, action);
    }

    #[test]
    fn test_expired_is_system_action() {
        let at = BASE_DATE.and_hms_opt(9, 0, 0).expect("valid time");
        let action = Action::expired(Uuid::new_v4(), "train left the section", at);
        assert_eq!(action.controller_id, SYSTEM_CONTROLLER);
        assert_eq!(action.action_type, ActionType::Expired);
    }
}

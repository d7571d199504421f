use serde::Deserialize;
use uuid::Uuid;

use super::{blank_text, nullable, nullable_date, required_text, FieldErrors};
use crate::db::{self, models::Goal};

/// Goal fields accepted from clients. `owner`, `id` and `created_at` are not
/// listed and therefore ignored when sent.
#[derive(Debug, Default, Deserialize)]
pub struct GoalPayload {
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub target_date: Option<Option<String>>,
}

#[derive(Debug, Default)]
pub struct GoalChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub target_date: Option<Option<String>>,
}

impl GoalPayload {
    pub fn validate(self, partial: bool, errors: &mut FieldErrors) -> GoalChanges {
        GoalChanges {
            title: required_text(errors, "title", self.title, partial, 255),
            description: blank_text(errors, "description", self.description, None),
            category: blank_text(errors, "category", self.category, Some(100)),
            target_date: nullable_date(errors, "target_date", self.target_date),
        }
    }
}

impl GoalChanges {
    pub fn apply(self, goal: &mut Goal) {
        if let Some(title) = self.title {
            goal.title = title;
        }
        if let Some(description) = self.description {
            goal.description = description;
        }
        if let Some(category) = self.category {
            goal.category = category;
        }
        if let Some(target_date) = self.target_date {
            goal.target_date = target_date;
        }
    }

    /// A new goal owned by `owner_id`, whatever the client claimed.
    pub fn create(self, owner_id: &str) -> Goal {
        let mut goal = Goal {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: String::new(),
            description: String::new(),
            category: String::new(),
            target_date: None,
            created_at: db::timestamp(),
        };
        self.apply(&mut goal);
        goal
    }
}

use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{
    choice, goal_reference, nullable, nullable_datetime, nullable_integer, required_text,
    FieldErrors,
};
use crate::db::{self, models::Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Done => "done",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskPayload {
    #[serde(default, deserialize_with = "nullable")]
    pub goal: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub status: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub estimated_hours: Option<Option<Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub completed_at: Option<Option<String>>,
}

#[derive(Debug, Default)]
pub struct TaskChanges {
    pub goal: Option<String>,
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub estimated_hours: Option<Option<i32>>,
    pub completed_at: Option<Option<String>>,
}

impl TaskPayload {
    /// Field-level checks only. Whether `goal` exists and belongs to the
    /// caller needs the database and is settled by the handler.
    pub fn validate(self, partial: bool, errors: &mut FieldErrors) -> TaskChanges {
        TaskChanges {
            goal: goal_reference(errors, self.goal, partial),
            title: required_text(errors, "title", self.title, partial, 255),
            status: choice(errors, "status", self.status),
            estimated_hours: nullable_integer(errors, "estimated_hours", self.estimated_hours),
            completed_at: nullable_datetime(errors, "completed_at", self.completed_at),
        }
    }
}

impl TaskChanges {
    pub fn apply(self, task: &mut Task) {
        if let Some(goal) = self.goal {
            task.goal_id = goal;
        }
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(status) = self.status {
            task.status = status.as_str().to_string();
        }
        if let Some(estimated_hours) = self.estimated_hours {
            task.estimated_hours = estimated_hours;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
    }

    pub fn create(self) -> Task {
        let mut task = Task {
            id: Uuid::new_v4().to_string(),
            goal_id: String::new(),
            title: String::new(),
            status: TaskStatus::default().as_str().to_string(),
            estimated_hours: None,
            completed_at: None,
            created_at: db::timestamp(),
        };
        self.apply(&mut task);
        task
    }
}

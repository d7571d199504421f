use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Goal {
    pub id: String,
    #[serde(skip_serializing)]
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_date: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: String,
    #[serde(rename = "goal")]
    pub goal_id: String,
    pub title: String,
    pub status: String,
    pub estimated_hours: Option<i32>,
    pub completed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "goal")]
    pub goal_id: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub added_at: String,
}

use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::{error::Result, middleware::auth::AuthUser, AppState};

const UNCATEGORIZED: &str = "Uncategorized";

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/summary/", get(summary))
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub goals_count: i64,
    pub tasks_total: i64,
    pub tasks_status: BTreeMap<String, i64>,
    pub goals_by_category: BTreeMap<String, i64>,
}

/// Counts over the caller's own goals and their tasks. Statuses with no
/// tasks are absent from `tasks_status`; blank categories are reported
/// as "Uncategorized".
async fn summarize(conn: &mut SqliteConnection, user_id: &str) -> Result<DashboardSummary> {
    let goals_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM goals WHERE owner_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

    let tasks_total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tasks t JOIN goals g ON g.id = t.goal_id WHERE g.owner_id = ?",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let tasks_status = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT t.status, COUNT(*)
        FROM tasks t
        JOIN goals g ON g.id = t.goal_id
        WHERE g.owner_id = ?
        GROUP BY t.status
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    let categories = sqlx::query_as::<_, (String, i64)>(
        "SELECT category, COUNT(*) FROM goals WHERE owner_id = ? GROUP BY category",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut goals_by_category = BTreeMap::new();
    for (category, total) in categories {
        let label = if category.is_empty() {
            UNCATEGORIZED.to_string()
        } else {
            category
        };
        *goals_by_category.entry(label).or_insert(0) += total;
    }

    Ok(DashboardSummary {
        goals_count,
        tasks_total,
        tasks_status,
        goals_by_category,
    })
}

async fn summary(State(state): State<AppState>, user: AuthUser) -> Result<Json<DashboardSummary>> {
    // One read transaction so the counts agree with each other
    let mut tx = state.db.pool.begin().await?;
    let summary = summarize(&mut tx, &user.id).await?;
    tx.commit().await?;

    Ok(Json(summary))
}

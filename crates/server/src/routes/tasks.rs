use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use sqlx::SqliteConnection;

use crate::{
    db::models::Task,
    error::{AppError, Result},
    extract::{GoalFilter, ValidJson},
    middleware::auth::AuthUser,
    serializers::{FieldErrors, TaskPayload},
    services::ownership::check_goal_reference,
    AppState,
};

const TASK_SELECT: &str = r#"
    SELECT t.id, t.goal_id, t.title, t.status, t.estimated_hours, t.completed_at, t.created_at
    FROM tasks t
    JOIN goals g ON g.id = t.goal_id
"#;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/", get(list_tasks).post(create_task))
        .route(
            "/tasks/:id/",
            get(get_task)
                .put(replace_task)
                .patch(update_task)
                .delete(delete_task),
        )
}

async fn fetch_owned_task(conn: &mut SqliteConnection, id: &str, user_id: &str) -> Result<Task> {
    sqlx::query_as::<_, Task>(&format!("{TASK_SELECT} WHERE t.id = ? AND g.owner_id = ?"))
        .bind(id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(AppError::not_found)
}

async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    filter: GoalFilter,
) -> Result<Json<Vec<Task>>> {
    // The goal filter narrows the owned set; a foreign goal id matches nothing
    let tasks = sqlx::query_as::<_, Task>(&format!(
        "{TASK_SELECT} WHERE g.owner_id = ? AND (?2 IS NULL OR t.goal_id = ?2) \
         ORDER BY t.created_at DESC, t.rowid DESC"
    ))
    .bind(&user.id)
    .bind(filter.goal_id())
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(body): ValidJson<TaskPayload>,
) -> Result<(StatusCode, Json<Task>)> {
    let mut errors = FieldErrors::default();
    let changes = body.validate(false, &mut errors);

    let mut tx = state.db.pool.begin().await?;
    check_goal_reference(&mut tx, changes.goal.as_deref(), &user.id, errors).await?;

    let task = changes.create();

    sqlx::query(
        "INSERT INTO tasks (id, goal_id, title, status, estimated_hours, completed_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&task.id)
    .bind(&task.goal_id)
    .bind(&task.title)
    .bind(&task.status)
    .bind(task.estimated_hours)
    .bind(&task.completed_at)
    .bind(&task.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Task>> {
    let mut conn = state.db.pool.acquire().await?;
    Ok(Json(fetch_owned_task(&mut conn, &id, &user.id).await?))
}

async fn replace_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<TaskPayload>,
) -> Result<Json<Task>> {
    write_task(state, user, id, body, false).await
}

async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<TaskPayload>,
) -> Result<Json<Task>> {
    write_task(state, user, id, body, true).await
}

async fn write_task(
    state: AppState,
    user: AuthUser,
    id: String,
    body: TaskPayload,
    partial: bool,
) -> Result<Json<Task>> {
    let mut tx = state.db.pool.begin().await?;
    let mut task = fetch_owned_task(&mut tx, &id, &user.id).await?;

    let mut errors = FieldErrors::default();
    let changes = body.validate(partial, &mut errors);
    // Moving a task re-checks the destination goal
    check_goal_reference(&mut tx, changes.goal.as_deref(), &user.id, errors).await?;
    changes.apply(&mut task);

    sqlx::query(
        "UPDATE tasks SET goal_id = ?, title = ?, status = ?, estimated_hours = ?, completed_at = ? WHERE id = ?",
    )
    .bind(&task.goal_id)
    .bind(&task.title)
    .bind(&task.status)
    .bind(task.estimated_hours)
    .bind(&task.completed_at)
    .bind(&task.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let deleted = sqlx::query(
        "DELETE FROM tasks WHERE id = ? AND goal_id IN (SELECT id FROM goals WHERE owner_id = ?)",
    )
    .bind(&id)
    .bind(&user.id)
    .execute(&state.db.pool)
    .await?
    .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}

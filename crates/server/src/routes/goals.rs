use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use sqlx::SqliteConnection;

use crate::{
    db::models::Goal,
    error::{AppError, Result},
    extract::ValidJson,
    middleware::auth::AuthUser,
    serializers::{FieldErrors, GoalPayload},
    AppState,
};

const GOAL_COLUMNS: &str = "id, owner_id, title, description, category, target_date, created_at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/goals/", get(list_goals).post(create_goal))
        .route(
            "/goals/:id/",
            get(get_goal)
                .put(replace_goal)
                .patch(update_goal)
                .delete(delete_goal),
        )
}

// Goals outside the caller's ownership read as missing
async fn fetch_owned_goal(conn: &mut SqliteConnection, id: &str, user_id: &str) -> Result<Goal> {
    sqlx::query_as::<_, Goal>(&format!(
        "SELECT {GOAL_COLUMNS} FROM goals WHERE id = ? AND owner_id = ?"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(AppError::not_found)
}

async fn list_goals(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Goal>>> {
    let goals = sqlx::query_as::<_, Goal>(&format!(
        "SELECT {GOAL_COLUMNS} FROM goals WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC"
    ))
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(goals))
}

async fn create_goal(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(body): ValidJson<GoalPayload>,
) -> Result<(StatusCode, Json<Goal>)> {
    let mut errors = FieldErrors::default();
    let changes = body.validate(false, &mut errors);
    errors.into_result()?;

    let goal = changes.create(&user.id);

    sqlx::query(
        "INSERT INTO goals (id, owner_id, title, description, category, target_date, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&goal.id)
    .bind(&goal.owner_id)
    .bind(&goal.title)
    .bind(&goal.description)
    .bind(&goal.category)
    .bind(&goal.target_date)
    .bind(&goal.created_at)
    .execute(&state.db.pool)
    .await?;

    tracing::debug!(goal_id = goal.id, username = user.username, "Created goal");

    Ok((StatusCode::CREATED, Json(goal)))
}

async fn get_goal(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Goal>> {
    let mut conn = state.db.pool.acquire().await?;
    Ok(Json(fetch_owned_goal(&mut conn, &id, &user.id).await?))
}

async fn replace_goal(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<GoalPayload>,
) -> Result<Json<Goal>> {
    write_goal(state, user, id, body, false).await
}

async fn update_goal(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<GoalPayload>,
) -> Result<Json<Goal>> {
    write_goal(state, user, id, body, true).await
}

async fn write_goal(
    state: AppState,
    user: AuthUser,
    id: String,
    body: GoalPayload,
    partial: bool,
) -> Result<Json<Goal>> {
    let mut tx = state.db.pool.begin().await?;
    let mut goal = fetch_owned_goal(&mut tx, &id, &user.id).await?;

    let mut errors = FieldErrors::default();
    let changes = body.validate(partial, &mut errors);
    errors.into_result()?;
    changes.apply(&mut goal);

    sqlx::query(
        "UPDATE goals SET title = ?, description = ?, category = ?, target_date = ? WHERE id = ? AND owner_id = ?",
    )
    .bind(&goal.title)
    .bind(&goal.description)
    .bind(&goal.category)
    .bind(&goal.target_date)
    .bind(&goal.id)
    .bind(&user.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(goal))
}

async fn delete_goal(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    // Tasks and resources go with it (ON DELETE CASCADE)
    let deleted = sqlx::query("DELETE FROM goals WHERE id = ? AND owner_id = ?")
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

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use sqlx::SqliteConnection;

use crate::{
    db::models::Resource,
    error::{AppError, Result},
    extract::{GoalFilter, ValidJson},
    middleware::auth::AuthUser,
    serializers::{FieldErrors, ResourcePayload},
    services::ownership::check_goal_reference,
    AppState,
};

const RESOURCE_SELECT: &str = r#"
    SELECT r.id, r.goal_id, r.title, r.url, r.kind, r.added_at
    FROM resources r
    JOIN goals g ON g.id = r.goal_id
"#;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/resources/", get(list_resources).post(create_resource))
        .route(
            "/resources/:id/",
            get(get_resource)
                .put(replace_resource)
                .patch(update_resource)
                .delete(delete_resource),
        )
}

async fn fetch_owned_resource(
    conn: &mut SqliteConnection,
    id: &str,
    user_id: &str,
) -> Result<Resource> {
    sqlx::query_as::<_, Resource>(&format!(
        "{RESOURCE_SELECT} WHERE r.id = ? AND g.owner_id = ?"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(AppError::not_found)
}

async fn list_resources(
    State(state): State<AppState>,
    user: AuthUser,
    filter: GoalFilter,
) -> Result<Json<Vec<Resource>>> {
    let resources = sqlx::query_as::<_, Resource>(&format!(
        "{RESOURCE_SELECT} WHERE g.owner_id = ? AND (?2 IS NULL OR r.goal_id = ?2) \
         ORDER BY r.added_at DESC, r.rowid DESC"
    ))
    .bind(&user.id)
    .bind(filter.goal_id())
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(resources))
}

async fn create_resource(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(body): ValidJson<ResourcePayload>,
) -> Result<(StatusCode, Json<Resource>)> {
    let mut errors = FieldErrors::default();
    let changes = body.validate(false, &mut errors);

    let mut tx = state.db.pool.begin().await?;
    check_goal_reference(&mut tx, changes.goal.as_deref(), &user.id, errors).await?;

    let resource = changes.create();

    sqlx::query(
        "INSERT INTO resources (id, goal_id, title, url, kind, added_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&resource.id)
    .bind(&resource.goal_id)
    .bind(&resource.title)
    .bind(&resource.url)
    .bind(&resource.kind)
    .bind(&resource.added_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(resource)))
}

async fn get_resource(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Resource>> {
    let mut conn = state.db.pool.acquire().await?;
    Ok(Json(fetch_owned_resource(&mut conn, &id, &user.id).await?))
}

async fn replace_resource(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<ResourcePayload>,
) -> Result<Json<Resource>> {
    write_resource(state, user, id, body, false).await
}

async fn update_resource(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<ResourcePayload>,
) -> Result<Json<Resource>> {
    write_resource(state, user, id, body, true).await
}

async fn write_resource(
    state: AppState,
    user: AuthUser,
    id: String,
    body: ResourcePayload,
    partial: bool,
) -> Result<Json<Resource>> {
    let mut tx = state.db.pool.begin().await?;
    let mut resource = fetch_owned_resource(&mut tx, &id, &user.id).await?;

    let mut errors = FieldErrors::default();
    let changes = body.validate(partial, &mut errors);
    check_goal_reference(&mut tx, changes.goal.as_deref(), &user.id, errors).await?;
    changes.apply(&mut resource);

    sqlx::query("UPDATE resources SET goal_id = ?, title = ?, url = ?, kind = ? WHERE id = ?")
        .bind(&resource.goal_id)
        .bind(&resource.title)
        .bind(&resource.url)
        .bind(&resource.kind)
        .bind(&resource.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(resource))
}

async fn delete_resource(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let deleted = sqlx::query(
        "DELETE FROM resources WHERE id = ? AND goal_id IN (SELECT id FROM goals WHERE owner_id = ?)",
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

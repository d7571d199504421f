use sqlx::SqliteConnection;

use crate::{
    error::{AppError, Result},
    serializers::FieldErrors,
};

/// Settles a client-supplied goal reference on a task or resource write.
///
/// Runs after field validation and finishes it: a reference to a goal that
/// does not exist is one more field error (400). Only a valid payload gets
/// the ownership check, where a goal owned by anyone but `user_id` is a 403.
/// `None` means the payload did not name a goal.
pub async fn check_goal_reference(
    conn: &mut SqliteConnection,
    goal_id: Option<&str>,
    user_id: &str,
    mut errors: FieldErrors,
) -> Result<()> {
    let mut owner = None;
    if let Some(goal_id) = goal_id {
        owner = sqlx::query_scalar::<_, String>("SELECT owner_id FROM goals WHERE id = ?")
            .bind(goal_id)
            .fetch_optional(&mut *conn)
            .await?;

        if owner.is_none() {
            errors.add(
                "goal",
                format!("Invalid pk \"{goal_id}\" - object does not exist."),
            );
        }
    }

    errors.into_result()?;

    match owner {
        Some(owner) if owner != user_id => {
            tracing::warn!(
                user_id,
                goal_id = goal_id.unwrap_or_default(),
                "Rejected write against a goal owned by another user"
            );
            Err(AppError::Forbidden("You do not own this goal.".to_string()))
        }
        _ => Ok(()),
    }
}

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use url::form_urlencoded;

use crate::error::AppError;

/// `Json` that rejects unreadable bodies with a 400 and a `detail` message
/// instead of axum's 415/422 plain-text rejections.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}

/// The `?goal=` narrowing shared by the task and resource lists.
///
/// Read leniently: a repeated key keeps its last value and undecodable
/// bytes are replaced, so the query string never fails the request.
/// An empty value does not filter.
#[derive(Debug, Default)]
pub struct GoalFilter {
    goal: Option<String>,
}

impl GoalFilter {
    pub fn from_query(query: Option<&str>) -> Self {
        let goal = query.and_then(|query| {
            form_urlencoded::parse(query.as_bytes())
                .filter(|(key, _)| key == "goal")
                .map(|(_, value)| value.into_owned())
                .last()
        });
        Self { goal }
    }

    pub fn goal_id(&self) -> Option<&str> {
        self.goal.as_deref().filter(|g| !g.is_empty())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for GoalFilter
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_query(parts.uri.query()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_filter_keeps_last_value() {
        let filter = GoalFilter::from_query(Some("goal=a&goal=b"));
        assert_eq!(filter.goal_id(), Some("b"));
    }

    #[test]
    fn goal_filter_ignores_empty_and_absent_values() {
        assert_eq!(GoalFilter::from_query(None).goal_id(), None);
        assert_eq!(GoalFilter::from_query(Some("goal=")).goal_id(), None);
        assert_eq!(GoalFilter::from_query(Some("page=2")).goal_id(), None);
    }

    #[test]
    fn goal_filter_decodes_and_tolerates_bad_escapes() {
        assert_eq!(
            GoalFilter::from_query(Some("goal=a%2Db")).goal_id(),
            Some("a-b")
        );
        assert_eq!(
            GoalFilter::from_query(Some("goal=%FF")).goal_id(),
            Some("\u{FFFD}")
        );
    }
}

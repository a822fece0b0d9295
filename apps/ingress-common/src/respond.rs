use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use echo_core::{Activity, ExpectedReplies};

/// 200 carrying the replies produced during the turn as `{"activities": [...]}`.
pub fn expected_replies(activities: Vec<Activity>) -> Response {
    (StatusCode::OK, Json(ExpectedReplies { activities })).into_response()
}

/// 200 with an empty body; replies were delivered out of band.
pub fn accepted() -> Response {
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn replies_are_wrapped_in_activities() {
        let response = expected_replies(vec![Activity::message("Echo: hi")]);
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let payload: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            payload,
            json!({ "activities": [{ "type": "message", "text": "Echo: hi" }] })
        );
    }

    #[tokio::test]
    async fn accepted_has_no_body() {
        let response = accepted();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }
}

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::api::handler::profile_id_from_body;
use crate::api::state::AppState;
use crate::api::ApiError;
use crate::models::{ProfileId, ProfileReport, ValidationError};

#[derive(Debug, Deserialize)]
pub struct AnalysisParams {
    #[serde(rename = "profileId", alias = "profile_id")]
    pub profile_id: Option<String>,
}

/// `GET /api/analysis?profileId=…`
pub async fn analysis_by_query(
    State(state): State<AppState>,
    Query(params): Query<AnalysisParams>,
) -> Result<Json<ProfileReport>, ApiError> {
    let profile_id: ProfileId = params
        .profile_id
        .ok_or(ValidationError::MissingProfileId)?
        .parse()?;
    Ok(Json(state.analyze(profile_id).await?))
}

/// `POST /api/analysis` with `{"profileId": …}`
pub async fn analysis_by_body(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ProfileReport>, ApiError> {
    let profile_id = profile_id_from_body(&Value::String(body))?;
    Ok(Json(state.analyze(profile_id).await?))
}

/// `GET /api/players/:profile_id/analysis`
pub async fn analysis_by_path(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
) -> Result<Json<ProfileReport>, ApiError> {
    let profile_id: ProfileId = profile_id.parse()?;
    Ok(Json(state.analyze(profile_id).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::build_router;
    use crate::api::state::testing::fake_state;
    use crate::calculate::fixtures::two_game_fixture;
    use crate::fetch::testing::FakeSource;
    use crate::storage::testing::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn app() -> axum::Router {
        let state = fake_state(
            FakeSource::with_games(vec![two_game_fixture()]),
            Arc::new(MemoryStore::default()),
        );
        build_router(state, "*")
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn post_json(app: axum::Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = get_json(app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_analysis_by_query() {
        let (status, json) = get_json(app(), "/api/analysis?profileId=1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["games_count"], 2);
        assert_eq!(json["profile_id"], 1);
        assert_eq!(json["analysis"]["match_stats"]["total"], 2);
        assert_eq!(json["analysis"]["allies"]["Bob"]["wins"], 1);
        assert_eq!(json["trends"]["longest_loss_streak"], 1);
    }

    #[tokio::test]
    async fn test_analysis_by_query_snake_case() {
        let (status, json) = get_json(app(), "/api/analysis?profile_id=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["games_count"], 2);
    }

    #[tokio::test]
    async fn test_analysis_by_query_missing_id() {
        let (status, json) = get_json(app(), "/api/analysis").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(
            json["error"]["message"],
            "Missing required parameter: profileId"
        );
    }

    #[tokio::test]
    async fn test_analysis_by_path() {
        let (status, json) = get_json(app(), "/api/players/1/analysis").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["analysis"]["opponents"]["Carol"]["games"], 2);

        let (status, _) = get_json(app(), "/api/players/abc/analysis").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analysis_by_body() {
        let (status, json) = post_json(app(), "/api/analysis", r#"{"profileId": 1}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["new_games"], 2);
    }

    #[tokio::test]
    async fn test_analysis_by_body_errors() {
        let (status, json) = post_json(app(), "/api/analysis", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"]["message"],
            "Missing required parameter: profileId"
        );

        let (status, json) = post_json(app(), "/api/analysis", "{oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, json) = get_json(app(), "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }
}

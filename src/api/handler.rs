//! Serverless-style event handler.
//!
//! Takes an invocation event and answers with `{statusCode, headers, body}`,
//! where `body` is a JSON string. The profile ID may arrive as a direct
//! field, in `queryStringParameters`, or inside `body` (a JSON string or an
//! already-decoded object).

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::{ApiError, AppState};
use crate::models::{ProfileId, ValidationError};

const PROFILE_ID_KEYS: [&str; 2] = ["profileId", "profile_id"];

/// Response in the shape serverless HTTP gateways expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HandlerResponse {
    fn new(status_code: u16, body: String) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::new(200, body),
            Err(e) => Self::error(&ApiError::Internal(e.to_string())),
        }
    }

    /// `{"error": message}` with the status of `err`.
    pub fn error(err: &ApiError) -> Self {
        let message = match err {
            ApiError::Validation(inner) => inner.to_string(),
            ApiError::NotFound(m) | ApiError::BadRequest(m) | ApiError::Internal(m) => m.clone(),
        };
        Self::new(err.status().as_u16(), json!({ "error": message }).to_string())
    }

    /// Decode `body` back into JSON.
    pub fn json_body(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// First non-null profile ID field of an object.
fn profile_id_field(value: &Value) -> Option<&Value> {
    PROFILE_ID_KEYS
        .iter()
        .filter_map(|key| value.get(key))
        .find(|v| !v.is_null())
}

/// Resolve the profile ID carried by a request body.
///
/// An absent or blank body means the ID is missing; a body that is present
/// but not JSON is a bad request.
pub fn profile_id_from_body(body: &Value) -> Result<ProfileId, ApiError> {
    let parsed;
    let body = match body {
        Value::Null => return Err(ValidationError::MissingProfileId.into()),
        Value::String(text) if text.trim().is_empty() => {
            return Err(ValidationError::MissingProfileId.into())
        }
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text).map_err(|e| {
                ApiError::BadRequest(format!("Request body is not valid JSON: {}", e))
            })?;
            &parsed
        }
        other => other,
    };

    if !body.is_object() {
        return Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    }
    match profile_id_field(body) {
        Some(value) => Ok(ProfileId::from_json(value)?),
        None => Err(ValidationError::MissingProfileId.into()),
    }
}

/// Resolve the profile ID of an invocation event.
pub fn extract_profile_id(event: &Value) -> Result<ProfileId, ApiError> {
    if let Some(value) = profile_id_field(event) {
        return Ok(ProfileId::from_json(value)?);
    }
    if let Some(value) = event
        .get("queryStringParameters")
        .and_then(profile_id_field)
    {
        return Ok(ProfileId::from_json(value)?);
    }
    profile_id_from_body(event.get("body").unwrap_or(&Value::Null))
}

/// Handle one invocation event.
pub async fn handle_event(state: &AppState, event: &Value) -> HandlerResponse {
    let profile_id = match extract_profile_id(event) {
        Ok(id) => id,
        Err(e) => {
            warn!("Rejected event: {}", e);
            return HandlerResponse::error(&e);
        }
    };

    match state.analyze(profile_id).await {
        Ok(report) => {
            info!(
                "Analyzed {} games for profile {}",
                report.games_count, profile_id
            );
            HandlerResponse::ok(&report)
        }
        Err(e) => HandlerResponse::error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::state::testing::fake_state;
    use crate::calculate::fixtures::two_game_fixture;
    use crate::fetch::testing::FakeSource;
    use crate::storage::testing::MemoryStore;
    use crate::storage::StorageConfig;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn state() -> AppState {
        fake_state(
            FakeSource::with_games(vec![two_game_fixture()]),
            Arc::new(MemoryStore::default()),
        )
    }

    #[test]
    fn test_extract_direct_field() {
        assert_eq!(
            extract_profile_id(&json!({"profileId": 42})).unwrap(),
            ProfileId::new(42)
        );
        assert_eq!(
            extract_profile_id(&json!({"profile_id": "42"})).unwrap(),
            ProfileId::new(42)
        );
    }

    #[test]
    fn test_extract_query_string() {
        let event = json!({"queryStringParameters": {"profileId": "7"}});
        assert_eq!(extract_profile_id(&event).unwrap(), ProfileId::new(7));
    }

    #[test]
    fn test_extract_body_string_and_object() {
        let event = json!({"body": "{\"profileId\": 9}"});
        assert_eq!(extract_profile_id(&event).unwrap(), ProfileId::new(9));

        let event = json!({"body": {"profileId": "9"}});
        assert_eq!(extract_profile_id(&event).unwrap(), ProfileId::new(9));
    }

    #[test]
    fn test_direct_field_wins_over_body() {
        let event = json!({"profileId": 1, "body": "{\"profileId\": 2}"});
        assert_eq!(extract_profile_id(&event).unwrap(), ProfileId::new(1));
    }

    #[test]
    fn test_null_query_string_falls_through_to_body() {
        let event = json!({"queryStringParameters": null, "body": "{\"profileId\": 3}"});
        assert_eq!(extract_profile_id(&event).unwrap(), ProfileId::new(3));
    }

    #[test]
    fn test_missing_profile_id() {
        for event in [
            json!({}),
            json!({"body": null}),
            json!({"body": ""}),
            json!({"body": "{}"}),
            json!({"queryStringParameters": {}}),
        ] {
            let err = extract_profile_id(&event).unwrap_err();
            assert!(
                matches!(err, ApiError::Validation(ValidationError::MissingProfileId)),
                "event {}",
                event
            );
        }
    }

    #[test]
    fn test_malformed_body_is_distinct_from_missing() {
        let err = extract_profile_id(&json!({"body": "{not json"})).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = extract_profile_id(&json!({"body": "[1, 2]"})).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_invalid_profile_id() {
        for event in [
            json!({"profileId": "abc"}),
            json!({"profileId": -5}),
            json!({"profileId": 0}),
            json!({"profileId": true}),
        ] {
            let err = extract_profile_id(&event).unwrap_err();
            assert!(
                matches!(err, ApiError::Validation(ValidationError::InvalidProfileId(_))),
                "event {}",
                event
            );
        }
    }

    #[tokio::test]
    async fn test_handle_event_missing_profile_id() {
        let response = handle_event(&state(), &json!({})).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.json_body().unwrap(),
            json!({"error": "Missing required parameter: profileId"})
        );
        assert_eq!(response.headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn test_handle_event_success() {
        let store = Arc::new(MemoryStore::default());
        let state = fake_state(
            FakeSource::with_games(vec![two_game_fixture()]),
            store.clone(),
        );

        let response = handle_event(&state, &json!({"profileId": "1"})).await;
        assert_eq!(response.status_code, 200);

        let body = response.json_body().unwrap();
        assert_eq!(body["games_count"], 2);
        assert_eq!(body["profile_id"], 1);
        assert_eq!(body["new_games"], 2);
        assert_eq!(body["analysis"]["match_stats"]["wins"], 1);
        assert_eq!(body["analysis"]["civ_stats"]["Britons"]["win_rate"], 50.0);
        assert_eq!(body["analysis"]["opponents"]["Carol"]["games"], 2);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_handle_event_pipeline_failure() {
        // A storage root that cannot hold a cache.
        let state = AppState {
            storage: Arc::new(StorageConfig::new("s3://")),
            ..state()
        };

        let response = handle_event(&state, &json!({"profileId": 1})).await;
        assert_eq!(response.status_code, 500);
        assert!(response.json_body().unwrap()["error"].is_string());
    }

    #[test]
    fn test_handler_response_serializes_camel_case() {
        let response = HandlerResponse::ok(&json!({"a": 1}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["body"], "{\"a\":1}");
    }
}

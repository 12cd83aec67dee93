//! Read-side routes for the accounts projection.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use courier_accounts::application::projections::AccountView;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /{account_id}
#[instrument(skip(state))]
async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountView>, ApiError> {
    state
        .balances
        .get(&account_id)
        .map(Json)
        .ok_or(ApiError::AccountNotFound(account_id))
}

/// Returns the accounts read router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{account_id}", get(get_account))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use courier_accounts::domain::events::{AccountEvent, AccountOpened};
    use courier_client::ClientConfig;
    use courier_core::event::Event;
    use courier_core::registry::TypeRegistry;
    use courier_test_support::{RecordingBroker, RecordingStorage};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_app_state() -> AppState {
        AppState::assemble(
            Arc::new(RecordingStorage::new()),
            Arc::new(RecordingBroker::new()),
            Arc::new(TypeRegistry::new()),
            ClientConfig::default(),
        )
        .await
        .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_account_returns_projected_view() {
        // Arrange
        let state = test_app_state().await;
        state.balances.apply(&Event::with_version(
            AccountEvent::Opened(AccountOpened {
                account_id: "acc-1".to_owned(),
                owner: "ada".to_owned(),
                balance: 40,
            }),
            1,
        ));
        let app = router().with_state(state);

        // Act
        let response = app.oneshot(get("/acc-1")).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["account_id"], "acc-1");
        assert_eq!(json["owner"], "ada");
        assert_eq!(json["balance"], 40);
        assert_eq!(json["status"], "open");
        assert_eq!(json["version"], 1);
    }

    #[tokio::test]
    async fn test_unknown_account_returns_404() {
        let app = router().with_state(test_app_state().await);

        let response = app.oneshot(get("/acc-missing")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "account_not_found");
    }
}

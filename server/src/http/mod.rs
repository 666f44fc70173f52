use crate::channels::SharedBroker;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use broker::BrokerError;
use tracing::{debug, error};

/// Single-endpoint router: GET serves the banner line, POST dispatches a
/// request envelope to the broker.
pub fn create_router(broker: SharedBroker) -> Router {
    Router::new()
        .route("/", get(index).post(dispatch))
        .with_state(broker)
}

async fn index() -> String {
    format!("Stopover v{}", env!("CARGO_PKG_VERSION"))
}

/// The broker answers with mirrored encoding and reports operational errors
/// in-band, so a successful dispatch is always a 200. Envelope-level
/// failures become a 400, anything else a 500 with no body.
async fn dispatch(State(broker): State<SharedBroker>, body: Bytes) -> Response {
    match broker.handle(&body).await {
        Ok(bytes) => bytes.into_response(),
        Err(BrokerError::BadRequest(reason)) => {
            debug!("bad request: {reason}");
            StatusCode::BAD_REQUEST.into_response()
        }
        Err(err) => {
            error!("request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use broker::config::{BrokerConfig, GlobalConfig};
    use broker::Broker;
    use std::sync::Arc;

    async fn test_server() -> (TestServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = BrokerConfig {
            global: GlobalConfig {
                data_dir: dir.path().to_path_buf(),
                partitions: 2,
                ..Default::default()
            },
            streams: Default::default(),
        };
        let broker = Arc::new(Broker::new(config));
        (TestServer::new(create_router(broker)).unwrap(), dir)
    }

    #[tokio::test]
    async fn index_reports_the_version() {
        let (server, _dir) = test_server().await;
        let response = server.get("/").await;
        response.assert_status_ok();
        assert!(response.text().starts_with("Stopover v"));
    }

    #[tokio::test]
    async fn json_envelopes_are_answered_in_json() {
        let (server, _dir) = test_server().await;
        let response = server
            .post("/")
            .bytes(br#"{"method":"knock","params":{"receiver_group":"g","receiver":"r"}}"#.as_slice().into())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = serde_json::from_slice(&response.as_bytes()).unwrap();
        assert_eq!(body["status"], 20);
    }

    #[tokio::test]
    async fn unknown_methods_are_rejected() {
        let (server, _dir) = test_server().await;
        let response = server
            .post("/")
            .bytes(br#"{"method":"bogus","params":{}}"#.as_slice().into())
            .await;
        response.assert_status_bad_request();
    }
}

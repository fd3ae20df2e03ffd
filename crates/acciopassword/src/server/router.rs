//! Axum router construction.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::{
    handlers,
    middleware::{self, PolicyLinks},
    state::AppState,
};

/// Request paths served by the API.
pub mod endpoint {
    pub const RANDOM: &str = "/v1/random";
    pub const DICEWARE: &str = "/v1/diceware";
    pub const PIN: &str = "/v1/pin";
    pub const METRICS: &str = "/v1/metrics";
    pub const HEALTH: &str = "/v1/health";
    pub const PING: &str = "/v1/ping";
}

/// Build the application [`Router`] with all routes and middleware attached.
///
/// Every endpoint answers with and without a trailing slash.
pub fn build(state: AppState, links: &PolicyLinks) -> Router {
    let routes = [
        (endpoint::RANDOM, get(handlers::random)),
        (endpoint::DICEWARE, get(handlers::diceware)),
        (endpoint::PIN, get(handlers::pin)),
        (endpoint::METRICS, get(handlers::metrics)),
        (endpoint::HEALTH, get(handlers::health)),
        (endpoint::PING, get(handlers::ping)),
    ];

    let router = routes
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            let method_router = method_router.options(handlers::options);
            router
                .route(path, method_router.clone())
                .route(&format!("{path}/"), method_router)
        })
        .fallback(handlers::not_found);

    middleware::wrap(router, links)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use axum::http::{header, HeaderValue, Method, StatusCode};
    use axum_test::TestServer;
    use common::protocol::{DependencyStatus, ErrorResponse, Health, Metrics, Password};

    use crate::generator::StandardGenerator;
    use crate::store::{counter::tests::dsn, CounterStore, Kind, Recorder};

    const UA: HeaderValue = HeaderValue::from_static("router-tests/1.0");

    struct Fixture {
        server: TestServer,
        store: CounterStore,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::open(&dsn(&dir)).await.unwrap();
        let (recorder, _task) = Recorder::spawn(store.clone());
        let state = AppState::new(store.clone(), recorder, Arc::new(StandardGenerator::new()));
        let links =
            PolicyLinks::new("https://example.com/privacy", "https://example.com/terms").unwrap();
        Fixture {
            server: TestServer::new(build(state, &links)).unwrap(),
            store,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_404_body() {
        let f = fixture().await;
        let resp = f
            .server
            .get("/v1/unknown")
            .add_header(header::USER_AGENT, UA)
            .await;
        resp.assert_status(StatusCode::NOT_FOUND);
        let body: ErrorResponse = resp.json();
        assert_eq!(body.code, 404);
        assert_eq!(body.message, "Page not found. Check the URL and try again.");
    }

    #[tokio::test]
    async fn method_rejected_before_user_agent_on_any_path() {
        let f = fixture().await;
        let resp = f.server.method(Method::PATCH, "/v1/nowhere").await;
        resp.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.header(header::ALLOW), "GET, HEAD, OPTIONS");
    }

    #[tokio::test]
    async fn trailing_slash_and_options_are_served() {
        let f = fixture().await;
        let resp = f
            .server
            .get("/v1/ping/")
            .add_header(header::USER_AGENT, UA)
            .await;
        resp.assert_status_ok();
        assert_eq!(resp.text(), "pong");
        assert_eq!(resp.header("privacy-policy"), "https://example.com/privacy");

        let resp = f
            .server
            .method(Method::OPTIONS, "/v1/random")
            .add_header(header::USER_AGENT, UA)
            .await;
        resp.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(resp.header(header::ALLOW), "GET, HEAD, OPTIONS");
    }

    #[tokio::test]
    async fn issued_password_is_counted() {
        let f = fixture().await;
        let resp = f
            .server
            .get("/v1/pin")
            .add_header(header::USER_AGENT, UA)
            .add_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .await;
        resp.assert_status_ok();
        let pin = resp.json::<Password>().pin.unwrap();
        assert_eq!(pin.len(), 6);
        assert!(pin.chars().all(|c| c.is_ascii_digit()));

        for _ in 0..100 {
            if f.store.count(Kind::Pin) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let metrics: Metrics = f
            .server
            .get("/v1/metrics")
            .add_header(header::USER_AGENT, UA)
            .await
            .json();
        assert_eq!(metrics, Metrics::new(0, 0, 1));
    }

    #[tokio::test]
    async fn rejected_request_is_not_counted() {
        let f = fixture().await;
        f.server
            .get("/v1/random")
            .add_query_param("length", 10_000)
            .add_header(header::USER_AGENT, UA)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.store.count(Kind::Random), 0);
    }

    #[tokio::test]
    async fn health_stays_200_when_database_is_gone() {
        let f = fixture().await;
        f.store.close().await.unwrap();
        let resp = f
            .server
            .get("/v1/health")
            .add_header(header::USER_AGENT, UA)
            .await;
        resp.assert_status_ok();
        let health: Health = resp.json();
        assert_eq!(health.dependencies[0].status, DependencyStatus::Offline);
    }
}

//! Axum request handlers for all service endpoints.

use std::collections::HashMap;

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::{
    error::ALLOWED_METHODS,
    protocol::{Dependency, DependencyStatus, Health, Metrics, Password},
    ServiceError,
};
use tracing::{error, warn};

use super::{error::ApiError, state::AppState};
use crate::generator::{
    DicewareOptions, GenerationError, PinOptions, RandomOptions, MAX_DICEWARE_LENGTH,
    MAX_PIN_LENGTH, MAX_RANDOM_LENGTH,
};
use crate::store::Kind;

/// Display name reported by `/health`.
pub const SERVICE_NAME: &str = "Accio Password";

const PONG: &str = "pong";

/// `GET /v1/random`: password from selectable character classes.
///
/// Query: `length`, `lowercase`, `uppercase`, `numbers`, `symbols`.
pub async fn random(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let params = Params::parse(query.as_deref());
    let defaults = RandomOptions::default();
    let options = RandomOptions {
        length: params.length("password", defaults.length, MAX_RANDOM_LENGTH)?,
        lowercase: params.flag("lowercase", defaults.lowercase)?,
        uppercase: params.flag("uppercase", defaults.uppercase)?,
        numbers: params.flag("numbers", defaults.numbers)?,
        symbols: params.flag("symbols", defaults.symbols)?,
    };

    let password = state
        .generator
        .random(&options)
        .map_err(|e| generation_failed(e, "random password"))?;

    let response = render(&headers, password, Password::random);
    state.recorder.record(Kind::Random);
    Ok(response)
}

/// `GET /v1/diceware`: passphrase of dictionary words.
///
/// Query: `length`, `separator`, `capitalize`.
pub async fn diceware(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let params = Params::parse(query.as_deref());
    let defaults = DicewareOptions::default();
    let options = DicewareOptions {
        length: params.length("password", defaults.length, MAX_DICEWARE_LENGTH)?,
        separator: params
            .get("separator")
            .map_or(defaults.separator, str::to_owned),
        capitalize: params.get("capitalize") == Some("true"),
    };

    let passphrase = state
        .generator
        .diceware(&options)
        .map_err(|e| generation_failed(e, "diceware password"))?;

    let response = render(&headers, passphrase, Password::diceware);
    state.recorder.record(Kind::Diceware);
    Ok(response)
}

/// `GET /v1/pin`: digits-only PIN. Query: `length`.
pub async fn pin(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let params = Params::parse(query.as_deref());
    let options = PinOptions {
        length: params.length("PIN", PinOptions::default().length, MAX_PIN_LENGTH)?,
    };

    let pin = state
        .generator
        .pin(&options)
        .map_err(|e| generation_failed(e, "PIN"))?;

    let response = render(&headers, pin, Password::pin);
    state.recorder.record(Kind::Pin);
    Ok(response)
}

/// `GET /v1/metrics`: issued counts from the in-memory mirror.
pub async fn metrics(State(state): State<AppState>) -> Json<Metrics> {
    Json(Metrics::new(
        state.store.count(Kind::Random),
        state.store.count(Kind::Diceware),
        state.store.count(Kind::Pin),
    ))
}

/// `GET /v1/health`: service identity and dependency status.
///
/// Always `200 OK`; an unreachable database is reported as `Offline`.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let status = match state.store.ping().await {
        Ok(()) => DependencyStatus::Online,
        Err(e) => {
            warn!(error = %e, "database is offline");
            DependencyStatus::Offline
        }
    };

    Json(Health {
        name: SERVICE_NAME.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        dependencies: vec![Dependency {
            service: "sqlite".into(),
            status,
        }],
    })
}

/// `GET /v1/ping`: heartbeat.
pub async fn ping() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], PONG)
}

/// `OPTIONS` on any route: advertise the allowed methods.
pub async fn options() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS))],
    )
}

/// Catch-all 404 handler.
pub async fn not_found() -> ApiError {
    ApiError(ServiceError::NotFound)
}

// ---------------------------------------------------------------------------
// Query and rendering helpers
// ---------------------------------------------------------------------------

/// Decoded query string; the first occurrence of a key wins.
struct Params(HashMap<String, String>);

impl Params {
    fn parse(query: Option<&str>) -> Self {
        let mut map = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            map.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        Self(map)
    }

    /// Non-empty value for `key`.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// `length`, falling back to `default` below 1 and rejecting values above `max`.
    fn length(&self, what: &str, default: usize, max: usize) -> Result<usize, ServiceError> {
        let Some(raw) = self.get("length") else {
            return Ok(default);
        };
        let value: i64 = raw.parse().map_err(|_| {
            ServiceError::RequestInvalid(format!(
                "Cannot parse the given {what} length. Please provide a valid integer."
            ))
        })?;
        if value < 1 {
            return Ok(default);
        }
        match usize::try_from(value) {
            Ok(length) if length <= max => Ok(length),
            _ => Err(ServiceError::RequestInvalid(format!(
                "The given {what} length is too long. Please provide a length less than or equal to {max}."
            ))),
        }
    }

    /// Boolean toggle `key`, or `default` when absent.
    fn flag(&self, key: &str, default: bool) -> Result<bool, ServiceError> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        parse_bool(raw).ok_or_else(|| {
            ServiceError::RequestInvalid(format!(
                "Cannot parse the given {key} flag. Please provide a valid boolean."
            ))
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Whether the client asked for JSON through its `Content-Type` header.
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

fn render(headers: &HeaderMap, value: String, wrap: fn(String) -> Password) -> Response {
    if wants_json(headers) {
        Json(wrap(value)).into_response()
    } else {
        ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], value).into_response()
    }
}

fn generation_failed(err: GenerationError, what: &'static str) -> ServiceError {
    error!(error = %err, what, "password generation failed");
    ServiceError::GenerationFailed(what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    use crate::generator::{MockPasswordGenerator, PasswordGenerator, StandardGenerator};
    use crate::store::{counter::tests::dsn, CounterStore, Recorder};

    async fn state_with(generator: Arc<dyn PasswordGenerator>) -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::open(&dsn(&dir)).await.unwrap();
        let (recorder, _task) = Recorder::spawn(store.clone());
        (AppState::new(store, recorder, generator), dir)
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/random", get(random))
            .route("/diceware", get(diceware))
            .route("/pin", get(pin))
            .route("/health", get(health))
            .with_state(state)
    }

    async fn get_body(app: Router, uri: &str, json: bool) -> (StatusCode, HeaderMap, Vec<u8>) {
        let mut req = Request::builder().uri(uri);
        if json {
            req = req.header(header::CONTENT_TYPE, "application/json");
        }
        let resp = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes.to_vec())
    }

    #[test]
    fn params_first_value_wins() {
        let p = Params::parse(Some("length=5&length=9&separator=%20"));
        assert_eq!(p.get("length"), Some("5"));
        assert_eq!(p.get("separator"), Some(" "));
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn length_rules() {
        let max = 10;
        assert_eq!(Params::parse(None).length("x", 4, max).unwrap(), 4);
        assert_eq!(Params::parse(Some("length=0")).length("x", 4, max).unwrap(), 4);
        assert_eq!(Params::parse(Some("length=-3")).length("x", 4, max).unwrap(), 4);
        assert_eq!(Params::parse(Some("length=10")).length("x", 4, max).unwrap(), 10);
        let too_long = Params::parse(Some("length=11")).length("x", 4, max).unwrap_err();
        assert!(too_long.message().contains("less than or equal to 10"));
        assert!(Params::parse(Some("length=ten")).length("x", 4, max).is_err());
    }

    #[test]
    fn bool_parsing_matches_accepted_spellings() {
        assert_eq!(parse_bool("T"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn json_detection_ignores_parameters() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(wants_json(&headers));
    }

    #[tokio::test]
    async fn random_plain_text_uses_requested_options() {
        let mut gen = MockPasswordGenerator::new();
        gen.expect_random()
            .withf(|o| o.length == 12 && !o.symbols && o.lowercase)
            .times(1)
            .returning(|_| Ok("abcDEF123456".into()));
        let (state, _dir) = state_with(Arc::new(gen)).await;

        let (status, headers, body) =
            get_body(router(state), "/random?length=12&symbols=false", false).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
        assert_eq!(body, b"abcDEF123456");
    }

    #[tokio::test]
    async fn diceware_json_shape() {
        let mut gen = MockPasswordGenerator::new();
        gen.expect_diceware()
            .withf(|o| o.length == 3 && o.separator == "." && o.capitalize)
            .returning(|_| Ok("One.Two.Three".into()));
        let (state, _dir) = state_with(Arc::new(gen)).await;

        let (status, _, body) = get_body(
            router(state),
            "/diceware?length=3&separator=.&capitalize=true",
            true,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"diceware": "One.Two.Three"}));
    }

    #[tokio::test]
    async fn invalid_flag_is_400_without_generating() {
        let mut gen = MockPasswordGenerator::new();
        gen.expect_random().never();
        let (state, _dir) = state_with(Arc::new(gen)).await;

        let (status, _, body) = get_body(router(state), "/random?numbers=maybe", false).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 400);
        assert!(json["message"].as_str().unwrap().contains("numbers"));
    }

    #[tokio::test]
    async fn over_long_pin_cites_maximum() {
        let (state, _dir) = state_with(Arc::new(StandardGenerator::new())).await;
        let uri = format!("/pin?length={}", MAX_PIN_LENGTH + 1);
        let (status, _, body) = get_body(router(state), &uri, false).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains(&MAX_PIN_LENGTH.to_string()));
    }

    #[tokio::test]
    async fn generation_failure_is_generic_500() {
        let mut gen = MockPasswordGenerator::new();
        gen.expect_random()
            .returning(|_| Err(GenerationError::NoCharacterClasses));
        let (state, _dir) = state_with(Arc::new(gen)).await;

        let (status, _, body) = get_body(router(state), "/random", false).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["message"],
            "Cannot generate random password. Please try again later."
        );
    }

    #[tokio::test]
    async fn health_reports_online_then_offline() {
        let (state, _dir) = state_with(Arc::new(StandardGenerator::new())).await;
        let app = router(state.clone());

        let (status, _, body) = get_body(app.clone(), "/health", false).await;
        assert_eq!(status, StatusCode::OK);
        let health: Health = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.name, SERVICE_NAME);
        assert_eq!(health.dependencies[0].status, DependencyStatus::Online);

        state.store.close().await.unwrap();
        let (status, _, body) = get_body(app, "/health", false).await;
        assert_eq!(status, StatusCode::OK);
        let health: Health = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.dependencies[0].status, DependencyStatus::Offline);
    }
}

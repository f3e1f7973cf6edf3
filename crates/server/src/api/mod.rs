use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
    sync::Arc,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use crud::{CrudError, CrudRequest, Outcome, RequestContext, SessionContext, SessionId, Translator, UrlBuilder};
use serde_json::{json, Value};
use shared::{
    domain::{Action, FieldMap, RecordKey},
    error::{ApiError, ErrorCode},
    protocol::Redirect,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, warn};
use url::{form_urlencoded, Url};
use uuid::Uuid;

use crate::app_state::AppState;

pub(crate) const SESSION_COOKIE: &str = "crud_session";
const CRUD_ROUTE: &str = "crud";
const HOME_ROUTE: &str = "home";
const PAGE_ARG: &str = "page";
const MAX_FORM_BYTES: usize = 64 * 1024;
const LINK_BASE: &str = "http://localhost/";

type HttpError = (StatusCode, ApiError);

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/:controller", any(crud_action))
        .route("/:controller/:action", any(crud_action))
        .route("/:controller/:action/:key", any(crud_action))
        .layer(RequestBodyLimitLayer::new(MAX_FORM_BYTES))
        .with_state(state)
}

/// Resolves the `crud` and `home` routes. Route parameters without a path
/// slot are appended as the query string.
pub(crate) struct RouteTable;

impl UrlBuilder for RouteTable {
    fn url(&self, route: &str, params: &BTreeMap<String, String>) -> String {
        let mut rest = params.clone();
        let mut segments = Vec::new();
        match route {
            CRUD_ROUTE => {
                for slot in ["controller", "action", "key"] {
                    let Some(value) = rest.remove(slot).filter(|value| !value.is_empty()) else {
                        break;
                    };
                    segments.push(value);
                }
            }
            HOME_ROUTE => {}
            other => warn!(route = other, "unknown route, linking to home"),
        }
        let mut path = encode_path(&segments).unwrap_or_else(|| "/".to_string());
        if !rest.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(rest.iter())
                .finish();
            path.push('?');
            path.push_str(&query);
        }
        path
    }
}

/// Percent-encodes each segment for use in a path; spaces become `%20`.
fn encode_path(segments: &[String]) -> Option<String> {
    let mut url = Url::parse(LINK_BASE).ok()?;
    url.path_segments_mut().ok()?.pop_if_empty().extend(segments);
    Some(url.path().to_string())
}

async fn home(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "controllers": state.controller_names(),
        "locales": state.catalogs.locales(),
    }))
}

async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    state.storage.health_check().await.map_err(|e| {
        error!(error = %e, "health check failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn crud_action(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(segments): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (session, issued) = match session_from(&headers) {
        Some(session) => (session, false),
        None => (SessionId::new(Uuid::new_v4().to_string()), true),
    };

    let mut response = match handle(&state, &method, &segments, &query, &headers, &body, &session)
        .await
    {
        Ok(response) => response,
        Err((status, err)) => (status, Json(err)).into_response(),
    };

    if issued {
        let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

async fn handle(
    state: &AppState,
    method: &Method,
    segments: &HashMap<String, String>,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &[u8],
    session: &SessionId,
) -> Result<Response, HttpError> {
    let name = segments.get("controller").map(String::as_str).unwrap_or_default();
    let controller = state
        .controller(name)
        .ok_or_else(|| not_found(format!("unknown controller '{name}'")))?;
    let action = Action::from_str(segments.get("action").map(String::as_str).unwrap_or_default())
        .map_err(|e| not_found(e.to_string()))?;

    let mut request = CrudRequest::new(action)
        .key(segments.get("key").and_then(|key| RecordKey::parse(key)))
        .page(query.get(PAGE_ARG).and_then(|page| page.parse::<u32>().ok()));
    if *method == Method::POST {
        request = request.post(parse_posted(headers, body)?);
    }

    let accept_language = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok());
    let translator = state.catalogs.negotiate(accept_language);
    debug!(controller = name, locale = translator.locale(), session = %session, "handling request");

    let ctx = RequestContext {
        session: SessionContext::new(session, state.sessions.as_ref()),
        translator,
        urls: &RouteTable,
    };
    let outcome = controller
        .dispatch(request, ctx)
        .await
        .map_err(|err| crud_failure(name, err))?;

    Ok(match outcome {
        Outcome::View(view) => Json(view.into_body()).into_response(),
        Outcome::Redirect(redirect) => see_other(&redirect),
    })
}

fn session_from(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
        .map(|id| SessionId::new(id.to_string()))
}

/// Reads a JSON object or an urlencoded form; form values stay strings.
fn parse_posted(headers: &HeaderMap, body: &[u8]) -> Result<FieldMap, HttpError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if !is_json {
        return Ok(form_urlencoded::parse(body)
            .map(|(name, value)| (name.into_owned(), Value::String(value.into_owned())))
            .collect());
    }
    if body.is_empty() {
        return Ok(FieldMap::new());
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            ApiError::new(ErrorCode::Validation, format!("invalid JSON body: {e}")),
        )
    })
}

fn see_other(redirect: &Redirect) -> Response {
    let location = RouteTable.url(&redirect.route, &redirect.params);
    match HeaderValue::from_str(&location) {
        Ok(location) => (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response(),
        Err(_) => {
            error!(%location, "redirect location is not a valid header");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(ErrorCode::Internal, "invalid redirect")),
            )
                .into_response()
        }
    }
}

fn not_found(message: String) -> HttpError {
    (
        StatusCode::NOT_FOUND,
        ApiError::new(ErrorCode::NotFound, message),
    )
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn crud_failure(controller: &str, err: CrudError) -> HttpError {
    let api = match err {
        CrudError::NotFound(key) => {
            ApiError::new(ErrorCode::NotFound, format!("record '{key}' not found"))
        }
        CrudError::Page(e) => ApiError::new(ErrorCode::Validation, e.to_string()),
        CrudError::Persistence(e) => ApiError::from(e),
        other => ApiError::new(ErrorCode::Internal, other.to_string()),
    };
    let status = status_for(api.code);
    if status.is_server_error() {
        error!(controller, error = %api.message, "request failed");
    } else {
        warn!(controller, error = %api.message, "request rejected");
    }
    (status, api)
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;

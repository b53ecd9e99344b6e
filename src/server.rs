// Mock remote endpoint - serves and accepts quotes over HTTP
//
// Speaks the `Quotes` payload format: bare JSON arrays of
// `{text, category, id}`. The placeholder API's `{id, title, body, userId}`
// posts are a separate format handled only on the client side.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::quote::{Quote, QuoteRecord, RecordSet};
use crate::store::{Store, SyncEvent};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    // Serializes load-modify-save on POST
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: (),
            error: Some(message),
        }),
    )
        .into_response()
}

fn wire(quote: &Quote) -> QuoteRecord {
    QuoteRecord {
        text: quote.text().to_string(),
        category: quote.category().to_string(),
        id: quote.id(),
        origin: None,
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/quotes
async fn list_quotes(State(state): State<AppState>) -> Response {
    match state.store.load() {
        Ok(set) => {
            let body: Vec<QuoteRecord> = set.iter().map(wire).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!("Error loading quotes: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load quotes".to_string())
        }
    }
}

/// GET /api/quotes/category/:name
async fn quotes_in_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let category = urlencoding::decode(&name)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| name.clone());

    match state.store.load() {
        Ok(set) => {
            let body: Vec<QuoteRecord> = set
                .filter_by_category(Some(&category))
                .into_iter()
                .map(wire)
                .collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!("Error loading quotes for category {}: {:#}", category, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load quotes".to_string())
        }
    }
}

/// POST /api/quotes - assigns the next id and echoes the stored quote
async fn create_quote(State(state): State<AppState>, Json(record): Json<QuoteRecord>) -> Response {
    let _guard = match state.write_lock.lock() {
        Ok(guard) => guard,
        Err(_) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "write lock poisoned".to_string())
        }
    };

    let mut set = match state.store.load() {
        Ok(set) => set,
        Err(e) => {
            error!("Error loading quotes: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load quotes".to_string());
        }
    };

    let quote = match Quote::remote(&record.text, &record.category, Some(next_id(&set))) {
        Ok(quote) => quote,
        Err(e) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };

    if !set.insert(quote.clone()) {
        return error_response(
            StatusCode::CONFLICT,
            format!("quote {:?} already exists", quote.text()),
        );
    }

    if let Err(e) = state.store.save(&set) {
        error!("Error saving quote: {:#}", e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to save quote".to_string());
    }

    let event = SyncEvent::new(
        "quote_posted",
        serde_json::json!({ "text": quote.text(), "id": quote.id() }),
        "quote-server",
    );
    if let Err(e) = state.store.record_event(&event) {
        error!("Error recording event: {:#}", e);
    }

    info!(id = ?quote.id(), "accepted quote {:?}", quote.text());
    (StatusCode::CREATED, Json(wire(&quote))).into_response()
}

fn next_id(set: &RecordSet) -> i64 {
    set.iter().filter_map(|q| q.id()).max().unwrap_or(0) + 1
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/quotes", get(list_quotes).post(create_quote))
        .route("/quotes/category/:name", get(quotes_in_category))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

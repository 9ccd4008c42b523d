use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::llm::LanguageModel;
use crate::router::QueryRouter;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub response: String,
    pub tools_called: Vec<String>,
    pub budget_exhausted: bool,
}

#[derive(Debug, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub server: String,
    pub input_schema: serde_json::Value,
}

pub fn app<M: LanguageModel + 'static>(router: Arc<QueryRouter<M>>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/query", post(handle_query::<M>))
        .route("/tools", get(list_tools::<M>))
        .with_state(router)
}

pub async fn serve<M: LanguageModel + 'static>(
    router: Arc<QueryRouter<M>>,
    addr: SocketAddr,
) -> Result<()> {
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(router).into_make_service()).await?;
    Ok(())
}

async fn handle_query<M: LanguageModel + 'static>(
    State(router): State<Arc<QueryRouter<M>>>,
    Json(req): Json<QueryRequest>,
) -> Response {
    match router.route(req.query).await {
        Ok(outcome) => {
            info!(
                tools_called = ?outcome.tools_called,
                budget_exhausted = outcome.budget_exhausted,
                "query answered"
            );
            Json(QueryResponse {
                response: outcome.answer,
                tools_called: outcome.tools_called,
                budget_exhausted: outcome.budget_exhausted,
            })
            .into_response()
        }
        Err(err) => {
            error!(error = %err, "query failed");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

async fn list_tools<M: LanguageModel + 'static>(
    State(router): State<Arc<QueryRouter<M>>>,
) -> impl IntoResponse {
    let payload: Vec<ToolSummary> = router
        .registry()
        .descriptors()
        .iter()
        .map(|descriptor| ToolSummary {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            server: descriptor.server.clone(),
            input_schema: descriptor.schema.to_json_schema(),
        })
        .collect();
    Json(payload)
}

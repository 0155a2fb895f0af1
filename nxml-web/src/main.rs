//! Servidor web Axum com WebSocket para montagem e filtragem de artigos sob demanda

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use nxml_core::{
    bioc::BiocDocument,
    pipeline::{NxmlPipeline, PipelineEvent},
    AssemblyStats, FilterOutcome, PipelineConfig, SegmenterMode,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{mpsc, Arc};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Estado compartilhado da aplicação
struct AppState {
    config: PipelineConfig,
}

impl AppState {
    /// Pipeline com as opções da requisição aplicadas sobre a configuração do servidor.
    fn pipeline_for(&self, keep_floats: Option<bool>, segmenter: Option<SegmenterMode>) -> NxmlPipeline {
        let mut config = self.config.clone();
        if let Some(keep_floats) = keep_floats {
            config.keep_floats = keep_floats;
        }
        if let Some(segmenter) = segmenter {
            config.segmenter = segmenter;
        }
        NxmlPipeline::new(config)
    }
}

/// Corpo de `POST /filter` e das mensagens WebSocket
#[derive(Deserialize)]
struct FilterRequest {
    /// Conteúdo do `.txt`
    text: String,
    /// Conteúdo do `.so`
    #[serde(default)]
    records: String,
    #[serde(default)]
    keep_floats: Option<bool>,
    #[serde(default)]
    segmenter: Option<SegmenterMode>,
}

#[derive(Serialize)]
struct FilterResponse {
    document: BiocDocument,
    assembly: AssemblyStats,
    malformed: usize,
    outcome: FilterOutcome,
    processing_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("NXML_CONFIG") {
        Ok(path) => match PipelineConfig::from_json_file(Path::new(&path)) {
            Ok(config) => {
                info!("Configuração carregada de {}", path);
                config
            }
            Err(e) => {
                warn!("Configuração inválida em {} ({}), usando padrão", path, e);
                PipelineConfig::default()
            }
        },
        Err(_) => PipelineConfig::default(),
    };

    let addr = std::env::var("NXML_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let app = router(Arc::new(AppState { config }));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Não foi possível abrir {}: {}", addr, e);
            return;
        }
    };
    info!("🚀 Servidor NXML iniciado em http://{}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Servidor encerrado com erro: {}", e);
    }
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/filter", post(filter_handler))
        .route("/ws", get(ws_handler))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Montagem + filtragem via HTTP POST (sem streaming)
async fn filter_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FilterRequest>,
) -> impl IntoResponse {
    if req.text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Texto vazio"})),
        )
            .into_response();
    }

    let start = std::time::Instant::now();
    let pipeline = state.pipeline_for(req.keep_floats, req.segmenter);
    let result = tokio::task::spawn_blocking(move || pipeline.process(&req.text, &req.records)).await;

    match result {
        Ok(result) => Json(FilterResponse {
            document: result.to_bioc(),
            assembly: result.assembly,
            malformed: result.malformed,
            outcome: result.outcome,
            processing_ms: start.elapsed().as_millis() as u64,
        })
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Lógica do WebSocket: recebe `{text, records, ...}`, executa o pipeline e envia cada evento
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket conectado");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                for event in &events_for(&state, &text).await {
                    if send_event(&mut socket, event).await.is_err() {
                        return; // cliente desconectou
                    }
                }
            }
            Message::Close(_) => {
                info!("WebSocket desconectado");
                return;
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}

/// Eventos em resposta a uma mensagem: os do pipeline, ou um único `Error` se a mensagem
/// for inválida.
async fn events_for(state: &AppState, message: &str) -> Vec<PipelineEvent> {
    let req = match serde_json::from_str::<FilterRequest>(message) {
        Ok(req) => req,
        Err(e) => return vec![PipelineEvent::Error { message: e.to_string() }],
    };
    if req.text.is_empty() {
        return vec![PipelineEvent::Error { message: "Texto vazio".to_string() }];
    }

    info!(
        "Processando via WebSocket: {} chars, {} bytes de registros",
        req.text.chars().count(),
        req.records.len()
    );

    let pipeline = state.pipeline_for(req.keep_floats, req.segmenter);
    stream_events(move |tx| pipeline.process_streaming(&req.text, &req.records, tx)).await
}

/// Roda `job` fora do runtime (o pipeline é síncrono) e coleta os eventos emitidos.
/// Se o job entrar em pânico, a lista termina com um `Error`.
async fn stream_events<F>(job: F) -> Vec<PipelineEvent>
where
    F: FnOnce(mpsc::Sender<PipelineEvent>) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<PipelineEvent>();
    let outcome = tokio::task::spawn_blocking(move || job(tx)).await;

    let mut events: Vec<PipelineEvent> = rx.try_iter().collect();
    if let Err(e) = outcome {
        warn!("Pipeline interrompido: {}", e);
        events.push(PipelineEvent::Error { message: format!("falha no processamento: {e}") });
    }
    events
}

async fn send_event(socket: &mut WebSocket, event: &PipelineEvent) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            warn!("Evento não serializável: {}", e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState { config: PipelineConfig::default() }))
    }

    async fn post_filter(body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::post("/filter")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    const TEXT: &str = "Body sentence.\nFigure caption.";
    const RECORDS: &str = "T1\tbody 0 14\t\nT2\tcaption 15 30\t";

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_filter_drops_caption() {
        let (status, json) = post_filter(serde_json::json!({"text": TEXT, "records": RECORDS})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["document"]["sentences"].as_array().unwrap().len(), 1);
        assert_eq!(json["outcome"]["status"], "filtered");
        assert_eq!(json["outcome"]["dropped"], 1);
    }

    #[tokio::test]
    async fn test_filter_keep_floats_override() {
        let (status, json) = post_filter(
            serde_json::json!({"text": TEXT, "records": RECORDS, "keep_floats": true}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["document"]["sentences"].as_array().unwrap().len(), 2);
    }

    fn state() -> AppState {
        AppState { config: PipelineConfig::default() }
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let response = app()
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_ws_events_end_with_done() {
        let message = serde_json::json!({"text": TEXT, "records": RECORDS}).to_string();
        let events = events_for(&state(), &message).await;
        assert!(matches!(events.first(), Some(PipelineEvent::RecordsParsed { total: 2, .. })));
        match events.last() {
            Some(PipelineEvent::Done { result, .. }) => assert_eq!(result.sentences.len(), 1),
            other => panic!("esperava Done, obteve {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ws_invalid_message_yields_error() {
        let events = events_for(&state(), "{not json").await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], PipelineEvent::Error { .. }));

        let events = events_for(&state(), r#"{"text": ""}"#).await;
        assert!(matches!(events.as_slice(), [PipelineEvent::Error { .. }]));
    }

    #[tokio::test]
    async fn test_ws_panicking_job_reports_error() {
        let events = stream_events(|tx| {
            let _ = tx.send(PipelineEvent::SegmentationDone { total: 3 });
            panic!("falha simulada no pipeline");
        })
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PipelineEvent::SegmentationDone { total: 3 }));
        match &events[1] {
            PipelineEvent::Error { message } => assert!(message.contains("falha no processamento")),
            other => panic!("esperava Error, obteve {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_filter_rejects_empty_text() {
        let (status, _) = post_filter(serde_json::json!({"text": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::indexer::ControlHandle;

/// `GET /health` returns 200 as long as the process is up; `GET /stop`
/// requests shutdown and waits for it to finish before replying, so a
/// caller (or an orchestrator's preStop hook) can rely on the response
/// meaning "drained, safe to kill" — mirrors the original's `status_server.go`
/// HTTP surface, rebuilt on the teacher's `axum` + `tower-http::TraceLayer`
/// stack from `rust/src/bin/agentic_server.rs`.
pub fn router(control: ControlHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stop", get(stop))
        .layer(TraceLayer::new_for_http())
        .with_state(control)
}

async fn health() -> &'static str {
    "ok"
}

async fn stop(State(control): State<ControlHandle>) -> &'static str {
    control.stop();
    control.wait_for_stop_done().await;
    "stopped"
}

/// Binds `addr` and serves the status router until the process exits.
/// Intended to be spawned alongside [`crate::Indexer::start`].
pub async fn serve(addr: SocketAddr, control: ControlHandle) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "status server listening");
    axum::serve(listener, router(control)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::watch;

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let (stop_tx, _stop_rx) = watch::channel(false);
        let (_stop_done_tx, stop_done_rx) = watch::channel(false);
        let control = ControlHandle { stop_tx, stop_done_rx };

        let app = router(control);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let body = reqwest_health(addr).await;
        assert_eq!(body, "ok");
    }

    async fn reqwest_health(addr: SocketAddr) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        text.rsplit("\r\n\r\n").next().unwrap_or("").to_string()
    }
}

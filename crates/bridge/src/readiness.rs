//! Gateway readiness probe.

use crate::signals::LifecycleSignals;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;

/// Slice used when waiting on signals between checks.
pub const POLL_SLICE: Duration = Duration::from_millis(500);

/// Per-attempt timeout of a health request.
pub const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait until the gateway has signaled `started` and `health_url` answers with a 2xx status.
///
/// Both phases share one deadline (`timeout`). Connection errors and timeouts while polling are
/// expected and ignored. Polling stops early when `finished` is set (the gateway already
/// exited). Returns whether readiness was confirmed; unreachability is never an error.
pub async fn wait_until_ready(
    client: &Client,
    signals: &LifecycleSignals,
    health_url: &str,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    tracing::debug!(?timeout, "Waiting for gateway to start");

    while !signals.started.is_set() {
        if signals.finished.is_set() {
            tracing::info!("Gateway exited before it started");
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::info!("Waiting for gateway start signal timed out");
            break;
        }
        let slice = remaining.min(POLL_SLICE);
        tokio::select! {
            _ = signals.started.wait(slice) => {}
            _ = signals.finished.wait(slice) => {}
        }
    }

    tracing::debug!(%health_url, "Checking gateway connectivity");
    while !signals.finished.is_set() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let attempt = client
            .get(health_url)
            .timeout(remaining.min(HEALTH_REQUEST_TIMEOUT))
            .send()
            .await;
        match attempt {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(%health_url, "Connection to gateway confirmed");
                return true;
            }
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "Gateway not ready yet");
            }
            Err(e) => {
                tracing::trace!("Gateway not reachable yet: {e}");
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        signals.finished.wait(remaining.min(POLL_SLICE)).await;
    }

    tracing::info!(%health_url, "Gateway readiness not confirmed");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_ready_when_started_and_reachable() {
        let base = serve(Router::new().route("/docs", get(|| async { "docs" }))).await;
        let signals = LifecycleSignals::new();
        signals.started.set();

        let ok = wait_until_ready(
            &Client::new(),
            &signals,
            &format!("{base}/docs"),
            Duration::from_secs(5),
        )
        .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_start_signal_is_noticed_without_waiting_a_slice() {
        let base = serve(Router::new().route("/docs", get(|| async { "docs" }))).await;
        let signals = LifecycleSignals::new();
        let setter = signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.started.set();
        });

        let began = Instant::now();
        let ok = wait_until_ready(
            &Client::new(),
            &signals,
            &format!("{base}/docs"),
            Duration::from_secs(5),
        )
        .await;
        assert!(ok);
        assert!(began.elapsed() < POLL_SLICE);
    }

    #[tokio::test]
    async fn test_keeps_polling_until_2xx() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/docs",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::OK
                    }
                }
            }),
        );
        let base = serve(router).await;
        let signals = LifecycleSignals::new();
        signals.started.set();

        let ok = wait_until_ready(
            &Client::new(),
            &signals,
            &format!("{base}/docs"),
            Duration::from_secs(10),
        )
        .await;
        assert!(ok);
        assert!(hits.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_unreachable_times_out_without_error() {
        let port = mcpo_test_support::pick_unused_port().unwrap();
        let signals = LifecycleSignals::new();
        signals.started.set();

        let started = Instant::now();
        let ok = wait_until_ready(
            &Client::new(),
            &signals,
            &format!("http://127.0.0.1:{port}/docs"),
            Duration::from_millis(1200),
        )
        .await;
        assert!(!ok);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_never_started_is_bounded() {
        let signals = LifecycleSignals::new();
        let started = Instant::now();
        let ok = wait_until_ready(
            &Client::new(),
            &signals,
            "http://127.0.0.1:9/docs",
            Duration::from_millis(700),
        )
        .await;
        assert!(!ok);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_finished_stops_polling_immediately() {
        let signals = LifecycleSignals::new();
        signals.started.set();
        signals.finished.set();

        let started = Instant::now();
        let ok = wait_until_ready(
            &Client::new(),
            &signals,
            "http://127.0.0.1:9/docs",
            Duration::from_secs(30),
        )
        .await;
        assert!(!ok);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

use actix_web::{http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_COUNT: AtomicU64 = AtomicU64::new(0);
static CLIENT_ERROR_COUNT: AtomicU64 = AtomicU64::new(0);
static SERVER_ERROR_COUNT: AtomicU64 = AtomicU64::new(0);

/// Counts one finished request; called from the `wrap_fn` installed in `main`.
pub fn record_response(status: StatusCode) {
    REQUEST_COUNT.fetch_add(1, Ordering::Relaxed);
    if status.is_client_error() {
        CLIENT_ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
    } else if status.is_server_error() {
        SERVER_ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct MetricsResponse {
    pub http_requests_total: u64,
    pub http_client_errors_total: u64,
    pub http_server_errors_total: u64,
}

fn snapshot() -> MetricsResponse {
    MetricsResponse {
        http_requests_total: REQUEST_COUNT.load(Ordering::Relaxed),
        http_client_errors_total: CLIENT_ERROR_COUNT.load(Ordering::Relaxed),
        http_server_errors_total: SERVER_ERROR_COUNT.load(Ordering::Relaxed),
    }
}

fn render(m: &MetricsResponse) -> String {
    format!(
        "# HELP http_requests_total Total number of HTTP requests\n\
         # TYPE http_requests_total counter\n\
         http_requests_total {}\n\
         \n\
         # HELP http_client_errors_total Responses with a 4xx status\n\
         # TYPE http_client_errors_total counter\n\
         http_client_errors_total {}\n\
         \n\
         # HELP http_server_errors_total Responses with a 5xx status\n\
         # TYPE http_server_errors_total counter\n\
         http_server_errors_total {}\n",
        m.http_requests_total, m.http_client_errors_total, m.http_server_errors_total
    )
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    responses(
        (status = 200, description = "Prometheus text exposition of the request counters", body = MetricsResponse)
    )
)]
pub async fn get_metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(render(&snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn render_lists_every_counter() {
        let text = render(&MetricsResponse {
            http_requests_total: 7,
            http_client_errors_total: 2,
            http_server_errors_total: 1,
        });
        assert!(text.contains("http_requests_total 7\n"));
        assert!(text.contains("http_client_errors_total 2\n"));
        assert!(text.contains("http_server_errors_total 1\n"));
    }

    #[actix_rt::test]
    async fn responses_are_counted_by_class() {
        let before = snapshot();
        record_response(StatusCode::OK);
        record_response(StatusCode::NOT_FOUND);
        record_response(StatusCode::BAD_GATEWAY);
        let after = snapshot();

        assert!(after.http_requests_total >= before.http_requests_total + 3);
        assert!(after.http_client_errors_total >= before.http_client_errors_total + 1);
        assert!(after.http_server_errors_total >= before.http_server_errors_total + 1);

        let response = get_metrics().await;
        assert!(response.status().is_success());
        let body = to_bytes(response.into_body()).await.unwrap();
        assert!(std::str::from_utf8(&body).unwrap().contains("# TYPE http_requests_total counter"));
    }
}

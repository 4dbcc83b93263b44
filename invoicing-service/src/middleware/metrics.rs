use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::services::metrics::{ERRORS_TOTAL, HTTP_REQUESTS_TOTAL};

/// Counts every request by matched route and status, and feeds the error
/// counter for 4xx/5xx responses.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    let status = response.status();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route.as_str(), status.as_str()])
        .inc();
    if let Some(error_type) = error_type_for(status) {
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();
    }

    response
}

fn error_type_for(status: StatusCode) -> Option<&'static str> {
    if status.is_server_error() {
        Some("server_error")
    } else if status.is_client_error() {
        Some("client_error")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert_eq!(error_type_for(StatusCode::OK), None);
        assert_eq!(error_type_for(StatusCode::CREATED), None);
        assert_eq!(error_type_for(StatusCode::CONFLICT), Some("client_error"));
        assert_eq!(
            error_type_for(StatusCode::INTERNAL_SERVER_ERROR),
            Some("server_error")
        );
    }
}

//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use order_store::OrderStoreError;
use saga::SagaError;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
///
/// Every failure body has the shape `{"error": <kind>, "message": ...}`,
/// plus whatever context the client needs to act on it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Order creation failed.
    #[error(transparent)]
    Saga(#[from] SagaError),
    /// Order store read failed.
    #[error(transparent)]
    Store(#[from] OrderStoreError),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, kind, context) = match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", Map::new()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", Map::new()),
            ApiError::Saga(err) => saga_error_to_response(&err),
            ApiError::Store(err) => store_error_to_response(&err),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", Map::new()),
        };

        if status.is_server_error() {
            tracing::error!(%status, kind, error = %message, "request failed");
        }

        let mut body = Map::new();
        body.insert("error".to_string(), json!(kind));
        body.insert("message".to_string(), json!(message));
        body.extend(context);
        (status, axum::Json(Value::Object(body))).into_response()
    }
}

fn saga_error_to_response(err: &SagaError) -> (StatusCode, &'static str, Map<String, Value>) {
    let mut context = Map::new();
    context.insert("retry_safe".to_string(), json!(err.is_retry_safe()));

    let status = match err {
        SagaError::EmptyCart | SagaError::InvalidCart(_) => StatusCode::BAD_REQUEST,
        SagaError::ProductUnavailable { product_id } => {
            context.insert("product_id".to_string(), json!(product_id));
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SagaError::InsufficientStock { product_id } => {
            context.insert("product_id".to_string(), json!(product_id));
            StatusCode::CONFLICT
        }
        SagaError::PaymentDeclined { reason } => {
            context.insert("reason".to_string(), json!(reason));
            StatusCode::PAYMENT_REQUIRED
        }
        SagaError::UpstreamUnavailable { service, .. } => {
            context.insert("service".to_string(), json!(service.as_str()));
            StatusCode::SERVICE_UNAVAILABLE
        }
        SagaError::OrderTimedOut => StatusCode::GATEWAY_TIMEOUT,
        SagaError::PaymentUnconfirmed { order_id, .. } => {
            context.insert("order_id".to_string(), json!(order_id.to_string()));
            StatusCode::INTERNAL_SERVER_ERROR
        }
        SagaError::PersistenceAmbiguous {
            order_id,
            transaction_id,
        } => {
            context.insert("order_id".to_string(), json!(order_id.to_string()));
            context.insert("transaction_id".to_string(), json!(transaction_id));
            StatusCode::INTERNAL_SERVER_ERROR
        }
        SagaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, err.kind(), context)
}

fn store_error_to_response(err: &OrderStoreError) -> (StatusCode, &'static str, Map<String, Value>) {
    match err {
        OrderStoreError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            Map::new(),
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal", Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use common::{OrderId, ProductId};
    use saga::Service;

    use super::*;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_insufficient_stock_names_product() {
        let (status, body) = render(ApiError::Saga(SagaError::InsufficientStock {
            product_id: ProductId::new("P1"),
        }))
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "insufficient_stock");
        assert_eq!(body["product_id"], "P1");
        assert_eq!(body["retry_safe"], true);
    }

    #[tokio::test]
    async fn test_upstream_unavailable_names_service() {
        let (status, body) = render(ApiError::Saga(SagaError::UpstreamUnavailable {
            service: Service::Payment,
            reason: "connection refused".to_string(),
        }))
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["service"], "payment");
    }

    #[tokio::test]
    async fn test_ambiguous_outcome_is_not_retry_safe() {
        let order_id = OrderId::new();
        let (status, body) = render(ApiError::Saga(SagaError::PersistenceAmbiguous {
            order_id,
            transaction_id: "txn_1".to_string(),
        }))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "persistence_ambiguous");
        assert_eq!(body["order_id"], order_id.to_string());
        assert_eq!(body["transaction_id"], "txn_1");
        assert_eq!(body["retry_safe"], false);
    }

    #[tokio::test]
    async fn test_unconfirmed_payment_is_not_retry_safe() {
        let order_id = OrderId::new();
        let (status, body) = render(ApiError::Saga(SagaError::PaymentUnconfirmed {
            order_id,
            reason: "charge accepted without a transaction id".to_string(),
        }))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "payment_unconfirmed");
        assert_eq!(body["order_id"], order_id.to_string());
        assert_eq!(body["retry_safe"], false);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_gateway_timeout() {
        let (status, body) = render(ApiError::Saga(SagaError::OrderTimedOut)).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "order_timed_out");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_store_outage_is_service_unavailable() {
        let (status, body) =
            render(ApiError::Store(OrderStoreError::Unavailable("down".to_string()))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "store_unavailable");
    }
}

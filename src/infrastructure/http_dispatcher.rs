use crate::domain::ports::Dispatcher;
use crate::domain::transaction::{ApiType, OutboundRequest, TransactionId};
use crate::error::{GatewayError, Result};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

pub const TRANSACTION_ID_HEADER: &str = "x-transaction-id";
pub const API_TYPE_HEADER: &str = "x-api-type";
pub const CALLBACK_URL_HEADER: &str = "x-callback-url";

/// Forwards requests to the backend over HTTP.
///
/// Each dispatch runs on its own task. The backend's immediate answer is only
/// an acknowledgement; it is logged and otherwise ignored. Failures are
/// logged too and never shorten the transaction's timeout.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    backend_url: String,
    callback_base_url: Option<String>,
}

impl HttpDispatcher {
    pub fn new(
        backend_url: impl Into<String>,
        callback_base_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::Dispatch(e.to_string()))?;
        Ok(Self {
            client,
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            callback_base_url: callback_base_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    /// `incar.search` is forwarded to `{backend_url}/incar/search`.
    pub fn endpoint(&self, api_type: &ApiType) -> String {
        format!(
            "{}/{}",
            self.backend_url,
            api_type.as_str().replace('.', "/")
        )
    }

    pub fn callback_url(&self, transaction_id: &TransactionId) -> Option<String> {
        self.callback_base_url
            .as_ref()
            .map(|base| format!("{base}/callback/{transaction_id}"))
    }

    /// Sends one request and returns the backend's acknowledgement body.
    pub async fn send(&self, request: &OutboundRequest) -> Result<String> {
        let mut builder = self
            .client
            .post(self.endpoint(&request.api_type))
            .header(CONTENT_TYPE, "application/json")
            .header(TRANSACTION_ID_HEADER, request.transaction_id.as_str())
            .header(API_TYPE_HEADER, request.api_type.as_str())
            .body(request.payload.clone());
        if let Some(url) = self.callback_url(&request.transaction_id) {
            builder = builder.header(CALLBACK_URL_HEADER, url);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Dispatch(e.to_string()))?;
        let status = response.status();
        let ack = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::Dispatch(format!(
                "backend answered {status}: {ack}"
            )));
        }
        Ok(ack)
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch(&self, request: OutboundRequest) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.send(&request).await {
                Ok(ack) => debug!(
                    transaction_id = %request.transaction_id,
                    api_type = %request.api_type,
                    ack = %ack,
                    "backend acknowledged request"
                ),
                Err(e) => warn!(
                    transaction_id = %request.transaction_id,
                    api_type = %request.api_type,
                    error = %e,
                    "dispatch failed; transaction keeps waiting for its deadline"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::routing::post;
    use tokio::sync::mpsc;

    type Captured = (String, HeaderMap, Bytes);

    async fn backend(status: StatusCode) -> (String, mpsc::UnboundedReceiver<Captured>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/*path",
            post(move |uri: Uri, headers: HeaderMap, body: Bytes| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((uri.path().to_string(), headers, body));
                    (status, "ack")
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), rx)
    }

    fn request() -> OutboundRequest {
        OutboundRequest {
            api_type: ApiType::new("incar.search"),
            transaction_id: TransactionId::parse("tx-1").unwrap(),
            payload: r#"{"carNo":"11가1234","transactionId":"tx-1"}"#.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_endpoint_and_callback_urls() {
        let dispatcher = HttpDispatcher::new(
            "http://backend:9090/",
            Some("https://gw.example.com/".into()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            dispatcher.endpoint(&ApiType::new("discount.add")),
            "http://backend:9090/discount/add"
        );
        assert_eq!(
            dispatcher
                .callback_url(&TransactionId::parse("T1").unwrap())
                .as_deref(),
            Some("https://gw.example.com/callback/T1")
        );
    }

    #[tokio::test]
    async fn test_dispatch_posts_payload_with_headers() {
        let (url, mut rx) = backend(StatusCode::OK).await;
        let dispatcher = HttpDispatcher::new(
            url,
            Some("http://gw:8080".into()),
            Duration::from_secs(5),
        )
        .unwrap();

        dispatcher.dispatch(request());

        let (path, headers, body) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path, "/incar/search");
        assert_eq!(headers[TRANSACTION_ID_HEADER], "tx-1");
        assert_eq!(headers[API_TYPE_HEADER], "incar.search");
        assert_eq!(headers[CALLBACK_URL_HEADER], "http://gw:8080/callback/tx-1");
        assert_eq!(body.as_ref(), request().payload.as_slice());
    }

    #[tokio::test]
    async fn test_send_reports_non_success_ack() {
        let (url, _rx) = backend(StatusCode::SERVICE_UNAVAILABLE).await;
        let dispatcher = HttpDispatcher::new(url, None, Duration::from_secs(5)).unwrap();

        let err = dispatcher.send(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Dispatch(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_send_reports_unreachable_backend() {
        let dispatcher =
            HttpDispatcher::new("http://127.0.0.1:1", None, Duration::from_secs(2)).unwrap();
        let err = dispatcher.send(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Dispatch(_)));
    }
}

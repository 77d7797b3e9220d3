// A padding oracle over HTTP.
//
// The server decrypts `predecessor || target` with its harness and answers
// 200 when the padding is valid, 403 when it is not. Blocks travel as hex in
// the query string.
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::future::BoxFuture;
use log::info;
use reqwest::Client;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::{AsyncPaddingOracle, CbcHarness, OracleOutcome, Result};

/// Serve `harness` as a padding oracle on `/check`, returning the base URL.
pub async fn spawn_oracle_server(
    address: impl ToSocketAddrs,
    harness: CbcHarness,
) -> Result<String> {
    let listener = TcpListener::bind(address).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(harness)).await {
            log::error!("oracle server stopped: {e}");
        }
    });
    info!("padding oracle listening on {addr}");
    Ok(format!("http://{}", addr))
}

pub fn router(harness: CbcHarness) -> Router {
    Router::new()
        .route("/check", get(check_padding))
        .with_state(Arc::new(harness))
}

async fn check_padding(
    State(harness): State<Arc<CbcHarness>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let decode = |name: &str| match params.get(name) {
        Some(value) => hex::decode(value).map_err(|e| format!("Illegal '{name}': {e}")),
        None => Err(format!("Missing '{name}' parameter")),
    };
    let (predecessor, target) = match (decode("predecessor"), decode("target")) {
        (Ok(p), Ok(t)) => (p, t),
        (Err(e), _) | (_, Err(e)) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    if harness.padding_valid(&predecessor, &target) {
        (StatusCode::OK, "Padding is valid").into_response()
    } else {
        (StatusCode::FORBIDDEN, "Invalid padding").into_response()
    }
}

/// Client side of the `/check` endpoint.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    base_url: String,
}

impl HttpOracle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn query(&self, predecessor: &[u8], target: &[u8]) -> OracleOutcome {
        let uri = format!(
            "{}/check?predecessor={}&target={}",
            self.base_url,
            hex::encode(predecessor),
            hex::encode(target)
        );
        match self.client.get(&uri).send().await {
            Ok(response) => match response.status() {
                reqwest::StatusCode::OK => OracleOutcome::Valid,
                reqwest::StatusCode::FORBIDDEN => OracleOutcome::Invalid,
                status => OracleOutcome::TransientError(format!("unexpected status {status}")),
            },
            Err(e) => OracleOutcome::TransientError(e.to_string()),
        }
    }
}

impl AsyncPaddingOracle for HttpOracle {
    fn check<'a>(
        &'a self,
        predecessor: &'a [u8],
        target: &'a [u8],
    ) -> BoxFuture<'a, OracleOutcome> {
        Box::pin(self.query(predecessor, target))
    }
}

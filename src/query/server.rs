// SPDX-License-Identifier: Apache-2.0

use crate::capture::{PduStore, TailProgress};
use crate::listener::Listener;
use crate::query::routes::{self, Reply};

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use http::Method;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;

use std::error::Error as StdError;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{debug, error, info};

/// HTTP endpoint serving the captured PDUs
pub struct QueryServer {
    store: PduStore,
    progress: Arc<TailProgress>,
}

impl QueryServer {
    pub fn new(store: PduStore, progress: Arc<TailProgress>) -> Self {
        Self { store, progress }
    }

    /// Serve requests until cancelled, then drain open connections
    pub async fn serve(
        &self,
        listener: Listener,
        cancellation: CancellationToken,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let svc = QueryService::new(self.store.clone(), self.progress.clone());
        let svc = TowerToHyperService::new(svc);

        let timer = hyper_util::rt::TokioTimer::new();
        let graceful = hyper_util::server::graceful::GracefulShutdown::new();

        let mut builder = Builder::new(TokioExecutor::new());
        builder.http1().timer(timer.clone());
        builder.http2().timer(timer);

        let listener = listener.into_async()?;
        info!(endpoint = ?listener.local_addr().ok(), "Query server listening");

        loop {
            let stream = tokio::select! {
                r = listener.accept() => {
                    match r {
                        Ok((stream, _)) => stream,
                        Err(e) => return Err(e.into()),
                    }
                },
                _ = cancellation.cancelled() => break
            };

            let io = TokioIo::new(stream);

            let conn = builder.serve_connection(io, svc.clone());
            let fut = graceful.watch(conn.into_owned());

            tokio::spawn(async move {
                let _ = fut.await.map_err(|e| {
                    error!("error serving query connection: {:?}", e);
                });
            });
        }

        graceful.shutdown().await;
        debug!("Query server stopped");

        Ok(())
    }
}

#[derive(Clone)]
struct QueryService {
    store: PduStore,
    progress: Arc<TailProgress>,
}

impl QueryService {
    fn new(store: PduStore, progress: Arc<TailProgress>) -> Self {
        Self { store, progress }
    }

    fn route(&self, method: &Method, path: &str, query: Option<&str>) -> Response<Full<Bytes>> {
        if !matches!(path, "/" | "/list" | "/search" | "/status") {
            return plain(StatusCode::NOT_FOUND, "Not Found");
        }

        if *method != Method::GET {
            let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET"));
            return response;
        }

        let reply: Reply = match path {
            "/" => routes::by_sequence(&self.store, query),
            "/list" => routes::list(&self.store, query),
            "/search" => routes::search(&self.store, query),
            _ => routes::status(&self.store, &self.progress),
        };
        let content_type = if reply.is_json() {
            "application/json; charset=utf-8"
        } else {
            "text/plain; charset=utf-8"
        };

        let mut response = Response::new(Full::new(
            reply.body.map(Bytes::from).unwrap_or_default(),
        ));
        *response.status_mut() = reply.status;
        if reply.status != StatusCode::NO_CONTENT {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        response
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

impl<H> Service<Request<H>> for QueryService
where
    H: Body + Send + Sync + 'static,
    <H as Body>::Data: Send + Sync + Clone,
    <H as Body>::Error: Display + Debug + Send + Sync + ToString,
{
    type Response = Response<Full<Bytes>>;
    type Error = hyper::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<H>) -> Self::Future {
        let response = self.route(req.method(), req.uri().path(), req.uri().query());
        debug!(
            method = %req.method(),
            uri = %req.uri(),
            status = response.status().as_u16(),
            "Handled query request"
        );
        Box::pin(futures::future::ok(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SubmitSm;
    use http_body_util::BodyExt;
    use hyper_util::client::legacy::Client;
    use hyper_util::client::legacy::connect::HttpConnector;
    use hyper_util::rt::TokioTimer;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::time::timeout;

    fn client() -> Client<HttpConnector, Full<Bytes>> {
        Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(2)
            .timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(HttpConnector::new())
    }

    async fn get(
        client: &Client<HttpConnector, Full<Bytes>>,
        uri: String,
    ) -> (StatusCode, Option<HeaderValue>, String) {
        let response = timeout(Duration::from_secs(5), client.get(uri.parse().unwrap()))
            .await
            .expect("Request timed out")
            .expect("Request failed");

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        (
            status,
            content_type,
            String::from_utf8(body.to_vec()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_query_endpoints() {
        let store = PduStore::new();
        store.push(SubmitSm {
            command_id: 4,
            sequence_number: 5,
            source_addr: "100".to_string(),
            destination_addr: "200".to_string(),
            message: "ping".to_string(),
            ..Default::default()
        });
        let progress = Arc::new(TailProgress::new("capture.log"));

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = Listener::listen_async(addr).await.unwrap();
        let bound_addr = listener.bound_address().unwrap();

        let server = QueryServer::new(store, progress);
        let cancellation = CancellationToken::new();
        let cancel_handle = cancellation.clone();
        let server_handle = tokio::spawn(async move { server.serve(listener, cancellation).await });

        let client = client();

        let (status, content_type, body) =
            get(&client, format!("http://{}/?id=5", bound_addr)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            content_type.unwrap(),
            HeaderValue::from_static("application/json; charset=utf-8")
        );
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["sequenceNumber"], 5);
        assert_eq!(json["message"], "ping");

        let (status, _, body) = get(&client, format!("http://{}/?id=6", bound_addr)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let (status, _, _) = get(&client, format!("http://{}/?id=x", bound_addr)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = get(&client, format!("http://{}/list", bound_addr)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&body)
                .unwrap()
                .as_array()
                .unwrap()
                .len(),
            1
        );

        let (status, _, body) =
            get(&client, format!("http://{}/search?q=pong", bound_addr)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");

        let (status, _, body) = get(&client, format!("http://{}/status", bound_addr)).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["records"], 1);
        assert_eq!(json["offset"], 0);

        let (status, _, _) = get(&client, format!("http://{}/invalid", bound_addr)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        cancel_handle.cancel();
        timeout(Duration::from_secs(5), server_handle)
            .await
            .expect("Server shutdown timed out")
            .expect("Server task failed")
            .expect("Server returned error");
    }

    #[test]
    fn test_non_get_is_rejected() {
        let svc = QueryService::new(PduStore::new(), Arc::new(TailProgress::new("capture.log")));

        let response = svc.route(&Method::POST, "/list", None);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "GET");

        let response = svc.route(&Method::POST, "/nowhere", None);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

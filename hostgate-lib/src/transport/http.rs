use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use url::Position;

use super::{Connection, TransportError, TransportFactory};
use crate::pool::HostKey;
use crate::{Request, Response};

/// Plain HTTP/1.1 transport over Tokio TCP streams.
///
/// Only the `http` scheme is supported.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    user_agent: Arc<str>,
}

impl HttpTransport {
    /// Create a transport sending `user_agent` with every request
    #[must_use]
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: Arc::from(user_agent),
        }
    }
}

#[async_trait]
impl TransportFactory for HttpTransport {
    async fn open(&self, key: &HostKey) -> Result<Box<dyn Connection>, TransportError> {
        if key.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme(key.scheme().to_string()));
        }

        // `HostKey` keeps IPv6 literals in brackets
        let host = key.host().trim_start_matches('[').trim_end_matches(']');
        let stream = TcpStream::connect((host, key.port()))
            .await
            .map_err(|e| TransportError::connect(key, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::connect(key, e))?;

        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| TransportError::connect(key, e))?;

        let driver_key = key.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::debug!("Connection to {driver_key} ended with error: {e}");
            }
        });

        log::debug!("Opened connection to {key}");
        Ok(Box::new(HttpConnection {
            sender,
            driver,
            user_agent: Arc::clone(&self.user_agent),
            reusable: true,
            closed: false,
        }))
    }
}

/// An HTTP/1.1 connection opened by [`HttpTransport`]
#[derive(Debug)]
pub struct HttpConnection {
    sender: http1::SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
    user_agent: Arc<str>,
    reusable: bool,
    closed: bool,
}

impl HttpConnection {
    fn build_request(&self, request: &Request) -> Result<http::Request<Full<Bytes>>, TransportError> {
        let url = &request.url;
        let mut builder = http::Request::builder()
            .method(request.method.clone())
            .uri(&url[Position::BeforePath..Position::AfterQuery]);

        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers.clone());
            if !headers.contains_key(header::HOST) {
                let authority = HeaderValue::from_str(&url[Position::BeforeHost..Position::AfterPort])
                    .map_err(TransportError::send)?;
                headers.insert(header::HOST, authority);
            }
            if !headers.contains_key(header::USER_AGENT) {
                let user_agent =
                    HeaderValue::from_str(&self.user_agent).map_err(TransportError::send)?;
                headers.insert(header::USER_AGENT, user_agent);
            }
        }

        builder
            .body(Full::new(request.body.clone()))
            .map_err(TransportError::send)
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn send(&mut self, request: &Request) -> Result<Response, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let outgoing = self.build_request(request)?;

        self.sender.ready().await.map_err(|e| {
            self.reusable = false;
            TransportError::send(e)
        })?;
        let response = self.sender.send_request(outgoing).await.map_err(|e| {
            self.reusable = false;
            TransportError::send(e)
        })?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| {
                self.reusable = false;
                TransportError::receive(e)
            })?
            .to_bytes();

        let response = Response::new(request.url.clone(), parts.status, parts.headers, body);
        if !response.is_keep_alive() {
            self.reusable = false;
        }
        Ok(response)
    }

    fn is_reusable(&self) -> bool {
        !self.closed && self.reusable && !self.sender.is_closed() && !self.driver.is_finished()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.driver.abort();
        }
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

//! HTTPS Transport
//!
//! Uses hyper with tokio for HTTP/1.1, rustls for TLS. One connection per
//! request; the registration flow makes a handful of calls per command so
//! pooling buys nothing.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use std::net::IpAddr;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use url::{Host, Position, Url};
use warp_account::{ApiSettings, RemoteError};

use crate::model::error_message;

/// Raw response from the registration API
#[derive(Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-2xx response into a [`RemoteError`]
    pub fn error_for_status(self) -> Result<Self, RemoteError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RemoteError::new(
                self.status.as_u16(),
                error_message(&self.body, self.status),
            ))
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RemoteError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            RemoteError::new(
                self.status.as_u16(),
                format!("unexpected response body: {}", e),
            )
        })
    }
}

/// HTTP transport bound to one API base URL
pub struct HttpTransport {
    /// `<base_url>/<version>/`
    base: Url,
    user_agent: String,
    client_version: String,
    timeout: Duration,
    tls: TlsConnector,
}

impl HttpTransport {
    pub fn new(settings: &ApiSettings) -> Result<Self, RemoteError> {
        let base = format!(
            "{}/{}/",
            settings.base_url.trim_end_matches('/'),
            settings.version.trim_matches('/')
        );
        let base = Url::parse(&base)
            .map_err(|e| RemoteError::transport(format!("invalid API url {}: {}", base, e)))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        debug!("Registration API at {} (timeout: {:?})", base, settings.timeout());

        Ok(Self {
            base,
            user_agent: settings.user_agent.clone(),
            client_version: settings.client_version.clone(),
            timeout: settings.timeout(),
            tls: TlsConnector::from(Arc::new(tls_config)),
        })
    }

    /// Resolve an API path against the versioned base
    pub fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| RemoteError::transport(format!("invalid API path {}: {}", path, e)))
    }

    /// Perform one request, bounded by the configured timeout
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse, RemoteError> {
        let url = self.url(path)?;
        let request = self.build_request(method.clone(), &url, token, body)?;
        let start = Instant::now();

        let response = tokio::time::timeout(self.timeout, self.exchange(&url, request))
            .await
            .map_err(|_| {
                warn!("{} {} timed out after {:?}", method, url.path(), self.timeout);
                RemoteError::timeout()
            })??;

        debug!(
            "HTTP {} {} -> {} ({} bytes, {:?})",
            method,
            url.path(),
            response.status,
            response.body.len(),
            start.elapsed()
        );
        Ok(response)
    }

    /// Build the request with the API's fixed headers
    pub(crate) fn build_request(
        &self,
        method: Method,
        url: &Url,
        token: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<Request<Full<Bytes>>, RemoteError> {
        let host = url
            .host_str()
            .ok_or_else(|| RemoteError::transport("no host in API url"))?;
        let host_header = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(&url[Position::BeforePath..])
            .header(HOST, host_header)
            .header(USER_AGENT, &self.user_agent)
            .header("CF-Client-Version", &self.client_version);

        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let body = match body {
            Some(data) => {
                builder = builder.header(CONTENT_TYPE, "application/json; charset=UTF-8");
                Bytes::from(data)
            }
            None => Bytes::new(),
        };

        builder
            .body(Full::new(body))
            .map_err(|e| RemoteError::transport(format!("invalid request: {}", e)))
    }

    async fn exchange(
        &self,
        url: &Url,
        request: Request<Full<Bytes>>,
    ) -> Result<TransportResponse, RemoteError> {
        let port = url
            .port_or_known_default()
            .ok_or_else(|| RemoteError::transport("no port for API url"))?;

        // IP literals connect directly; host_str() keeps IPv6 brackets
        let (stream, server_name) = match url.host() {
            Some(Host::Domain(domain)) => {
                let stream = TcpStream::connect((domain, port)).await;
                (stream, ServerName::try_from(domain.to_string()))
            }
            Some(Host::Ipv4(ip)) => (
                TcpStream::connect((ip, port)).await,
                Ok(ServerName::IpAddress(IpAddr::V4(ip).into())),
            ),
            Some(Host::Ipv6(ip)) => (
                TcpStream::connect((ip, port)).await,
                Ok(ServerName::IpAddress(IpAddr::V6(ip).into())),
            ),
            None => return Err(RemoteError::transport("no host in API url")),
        };
        let stream =
            stream.map_err(|e| RemoteError::transport(format!("connection failed: {}", e)))?;

        match url.scheme() {
            "https" => {
                let server_name =
                    server_name.map_err(|_| RemoteError::transport("invalid server name"))?;
                let tls_stream = self.tls
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| RemoteError::transport(format!("TLS error: {}", e)))?;
                send_over(TokioIo::new(tls_stream), request).await
            }
            "http" => send_over(TokioIo::new(stream), request).await,
            other => Err(RemoteError::transport(format!("unsupported scheme {}", other))),
        }
    }
}

async fn send_over<I>(io: I, request: Request<Full<Bytes>>) -> Result<TransportResponse, RemoteError>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| RemoteError::transport(format!("HTTP handshake failed: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            warn!("Connection error: {}", e);
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| RemoteError::transport(format!("request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| RemoteError::transport(format!("body read error: {}", e)))?
        .to_bytes()
        .to_vec();

    Ok(TransportResponse { status, body })
}

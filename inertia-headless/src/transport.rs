//! HTTP transport: sends visit requests with reqwest, reports upload progress for
//! multipart bodies.

use futures_util::stream;
use inertia_core::protocol::{ACCEPT, HEADER_INERTIA};
use inertia_core::{Method, Progress, Request, RequestBody, Response, TransportError, TransportErrorKind};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::sync::mpsc;
use url::Url;

use crate::config::Config;

/// Upload chunk size; one progress report per chunk.
const UPLOAD_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout());
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder.build().map_err(transport_error)?;
        Ok(Self { client })
    }

    /// Fetch the first page of a session the way a protocol-aware document load would.
    pub async fn fetch_initial(&self, url: &Url) -> Result<Response, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header("Accept", ACCEPT)
            .header(HEADER_INERTIA, "true")
            .send()
            .await
            .map_err(transport_error)?;
        into_response(response).await
    }

    /// Send a visit request. Progress is reported on `progress` while a multipart
    /// body streams out.
    pub async fn send(
        &self,
        request: &Request,
        progress: Option<mpsc::UnboundedSender<Progress>>,
    ) -> Result<Response, TransportError> {
        let mut builder = self.client.request(reqwest_method(request.method), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(content_type) = request.body.content_type() {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder = match (&request.body, progress) {
            (RequestBody::Empty, _) => builder,
            (RequestBody::Multipart(body), Some(tx)) => builder
                .header(CONTENT_LENGTH, body.bytes.len())
                .body(progress_body(body.bytes.clone(), tx)),
            (body, _) => builder.body(body.bytes().to_vec()),
        };
        let response = builder.send().await.map_err(transport_error)?;
        into_response(response).await
    }
}

fn progress_body(bytes: Vec<u8>, tx: mpsc::UnboundedSender<Progress>) -> reqwest::Body {
    let total = bytes.len() as u64;
    let chunks: Vec<Vec<u8>> = bytes.chunks(UPLOAD_CHUNK).map(<[u8]>::to_vec).collect();
    let mut loaded = 0u64;
    let chunks = chunks.into_iter().map(move |chunk| {
        loaded += chunk.len() as u64;
        let _ = tx.send(Progress::new(loaded, Some(total)));
        Ok::<_, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream::iter(chunks))
}

async fn into_response(response: reqwest::Response) -> Result<Response, TransportError> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let body = response.bytes().await.map_err(transport_error)?.to_vec();
    Ok(Response {
        status,
        headers,
        body,
    })
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_connect() {
        TransportErrorKind::Connect
    } else if e.is_body() || e.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, e.to_string())
}

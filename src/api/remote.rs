//! Purpose: HTTP client for a running `shelfstore serve` instance.
//! Exports: `RemoteClient`.
//! Role: Mirrors `RecordService` reads and mutations over the JSON wire format.
//! Invariants: Requests hit `/crud`, `/catalog`, and `/products` under the
//! configured base URL; failure envelopes map back to `ErrorKind`.
#![allow(clippy::result_large_err)]

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::request::{Action, CrudRequest, Target};
use crate::core::error::{Error, ErrorKind};
use crate::core::products::Record;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct StatusEnvelope {
    success: bool,
    error: Option<String>,
    kind: Option<String>,
}

#[derive(Deserialize)]
struct CatalogEnvelope {
    content: String,
}

#[derive(Deserialize)]
struct ProductsEnvelope {
    data: Vec<Record>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(RemoteClientInner { base_url, agent }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn catalog(&self) -> ApiResult<String> {
        let envelope: CatalogEnvelope = self.get_json("catalog")?;
        Ok(envelope.content)
    }

    pub fn products(&self) -> ApiResult<Vec<Record>> {
        let envelope: ProductsEnvelope = self.get_json("products")?;
        Ok(envelope.data)
    }

    pub fn crud(&self, action: Action, target: Target, data: Value) -> ApiResult<()> {
        self.send(&CrudRequest::new(action, target, data))
    }

    pub fn send(&self, request: &CrudRequest) -> ApiResult<()> {
        let url = self.endpoint("crud")?;
        let payload = serde_json::to_string(request).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        let response = self
            .inner
            .agent
            .post(url.as_str())
            .set("Accept", "application/json")
            .set("Content-Type", "application/json")
            .send_string(&payload);
        let envelope: StatusEnvelope = match response {
            Ok(resp) => read_json_response(resp)?,
            Err(ureq::Error::Status(code, resp)) => return Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message("request failed")
                    .with_source(err));
            }
        };
        if envelope.success {
            Ok(())
        } else {
            Err(error_from_envelope(envelope, None))
        }
    }

    fn get_json<R: DeserializeOwned>(&self, path: &str) -> ApiResult<R> {
        let url = self.endpoint(path)?;
        let response = self
            .inner
            .agent
            .get(url.as_str())
            .set("Accept", "application/json")
            .call();
        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        }
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.inner.base_url.join(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid endpoint url")
                .with_source(err)
        })
    }
}

fn normalize_base_url(input: String) -> ApiResult<Url> {
    let mut url = Url::parse(&input).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid base url")
            .with_hint("Use a URL like http://127.0.0.1:5000 or http://host:5000/api.")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("base url must use http or https"));
    }
    if url.cannot_be_a_base() {
        return Err(Error::new(ErrorKind::Usage).with_message("base url cannot be a base"));
    }
    // Url::join replaces the last segment unless the path ends with '/'.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<StatusEnvelope>(&body) {
        return error_from_envelope(envelope, Some(status));
    }
    Error::new(error_kind_from_status(status)).with_message(format!("remote error status {status}"))
}

fn error_from_envelope(envelope: StatusEnvelope, status: Option<u16>) -> Error {
    let kind = envelope
        .kind
        .as_deref()
        .and_then(parse_failure_kind)
        .or_else(|| status.map(error_kind_from_status))
        .unwrap_or(ErrorKind::Internal);
    let message = envelope.error.unwrap_or_else(|| "remote request failed".to_string());
    Error::new(kind).with_message(message)
}

fn parse_failure_kind(kind: &str) -> Option<ErrorKind> {
    match kind {
        "ValidationError" => Some(ErrorKind::Validation),
        "NotFound" => Some(ErrorKind::NotFound),
        "Conflict" => Some(ErrorKind::AlreadyExists),
        "StorageError" => Some(ErrorKind::Io),
        _ => None,
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::Validation,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::AlreadyExists,
        500..=599 => ErrorKind::Io,
        _ => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::{RemoteClient, StatusEnvelope, error_from_envelope, error_kind_from_status};
    use crate::core::error::ErrorKind;

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = RemoteClient::new("http://127.0.0.1:5000/api").expect("client");
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:5000/api/");
        assert_eq!(
            client.endpoint("crud").expect("url").as_str(),
            "http://127.0.0.1:5000/api/crud"
        );
    }

    #[test]
    fn root_base_url_joins_plainly() {
        let client = RemoteClient::new("http://localhost:5000").expect("client");
        assert_eq!(
            client.endpoint("products").expect("url").as_str(),
            "http://localhost:5000/products"
        );
    }

    #[test]
    fn non_http_urls_are_usage_errors() {
        for input in ["ftp://example.com", "not a url"] {
            let err = RemoteClient::new(input).err().expect("err");
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }

    #[test]
    fn envelope_kind_wins_over_status() {
        let envelope = StatusEnvelope {
            success: false,
            error: Some("Product 'Ghost' not found".to_string()),
            kind: Some("NotFound".to_string()),
        };
        let err = error_from_envelope(envelope, Some(500));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), Some("Product 'Ghost' not found"));
    }

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(error_kind_from_status(400), ErrorKind::Validation);
        assert_eq!(error_kind_from_status(404), ErrorKind::NotFound);
        assert_eq!(error_kind_from_status(409), ErrorKind::AlreadyExists);
        assert_eq!(error_kind_from_status(500), ErrorKind::Io);
    }
}

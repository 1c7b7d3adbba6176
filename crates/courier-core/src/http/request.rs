//! Request descriptors handed to the dispatcher
//!
//! A [`RequestDescriptor`] bundles everything one dispatch needs: the
//! outgoing [`ApiRequest`], the predicate deciding which statuses count as
//! success, and the parser turning a success body into a typed value.

use std::marker::PhantomData;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::http::error::ParseError;

/// Errors raised while building an [`ApiRequest`]
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid request URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// An outgoing HTTP request described as plain data
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl ApiRequest {
    /// Create a request without body or headers
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        let url = Url::parse(url).map_err(|source| RequestError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        })
    }

    /// Create a GET request
    pub fn get(url: &str) -> Result<Self, RequestError> {
        Self::new(Method::GET, url)
    }

    /// Create a POST request carrying `payload` as JSON
    pub fn post_json<B: Serialize + ?Sized>(url: &str, payload: &B) -> Result<Self, RequestError> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self::new(Method::POST, url)?
            .with_header_value(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(body))
    }

    /// Add a header, validating name and value
    pub fn header(self, name: &str, value: &str) -> Result<Self, RequestError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| RequestError::InvalidHeader {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| RequestError::InvalidHeader {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        Ok(self.with_header_value(header_name, header_value))
    }

    fn with_header_value(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the request body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body, if any
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Turn this description into a reqwest request on `client`
    pub(crate) fn to_reqwest(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let mut builder = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());

        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }

        builder
    }
}

/// Parse HTTP method from string
pub fn parse_method(method_str: &str) -> Result<Method, RequestError> {
    match method_str.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        "HEAD" => Ok(Method::HEAD),
        _ => Err(RequestError::UnsupportedMethod(method_str.to_string())),
    }
}

/// Everything the dispatcher needs to run and interpret one request
///
/// Implementations are borrowed immutably for the whole dispatch.
pub trait RequestDescriptor: Send + Sync {
    /// Value produced from a successful response
    type Output: Send;

    /// The request to send
    fn request(&self) -> &ApiRequest;

    /// Target URL, used for proxy selection and diagnostics
    fn url(&self) -> &str {
        self.request().url().as_str()
    }

    /// Whether `status` counts as success; any 2xx by default
    fn is_success(&self, status: StatusCode) -> bool {
        status.is_success()
    }

    /// Turn a success body into the output value
    fn parse_success(&self, body: &str) -> Result<Self::Output, ParseError>;
}

/// Descriptor for JSON APIs: success bodies deserialize into `T`
pub struct JsonRequest<T> {
    request: ApiRequest,
    success: fn(StatusCode) -> bool,
    _output: PhantomData<fn() -> T>,
}

impl<T> JsonRequest<T> {
    /// Wrap a request; any 2xx status is a success
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            success: |status| status.is_success(),
            _output: PhantomData,
        }
    }

    /// Override the success predicate
    pub fn with_success(mut self, success: fn(StatusCode) -> bool) -> Self {
        self.success = success;
        self
    }
}

impl<T> std::fmt::Debug for JsonRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRequest")
            .field("request", &self.request)
            .field("output", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned + Send> RequestDescriptor for JsonRequest<T> {
    type Output = T;

    fn request(&self) -> &ApiRequest {
        &self.request
    }

    fn is_success(&self, status: StatusCode) -> bool {
        (self.success)(status)
    }

    fn parse_success(&self, body: &str) -> Result<T, ParseError> {
        serde_json::from_str(body).map_err(|e| Box::new(e) as ParseError)
    }
}

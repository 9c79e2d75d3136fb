//! Blocking HTTP exchange
//!
//! The backend client builds [`Request`]s and interprets [`Response`]s; the
//! transport only moves bytes. Any status code, success or not, comes back as
//! `Ok(Response)`. `Err` is reserved for exchanges that produced no status at
//! all, which the engine classifies as a connectivity failure.

use alloc::string::String;
use alloc::vec::Vec;

use crate::errors::TransportError;

/// HTTP verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read
    Get,
    /// Create
    Post,
    /// Partial update
    Patch,
}

impl Method {
    /// Verb as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

/// Outgoing request, relative to the transport's base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP verb
    pub method: Method,
    /// Path and query, starting with `/`
    pub path: String,
    /// Header name/value pairs in send order
    pub headers: Vec<(String, String)>,
    /// JSON body, if any
    pub body: Option<String>,
}

impl Request {
    /// Request with no headers or body
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First value of header `name`, compared case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response with any status code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Body text, empty when the server sent none
    pub body: String,
}

impl Response {
    /// Response with a body
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One blocking request/response exchange, bounded by the transport's timeout
pub trait Transport {
    /// Perform `request` and return whatever status the server produced
    fn execute(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for alloc::sync::Arc<T> {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).execute(request)
    }
}

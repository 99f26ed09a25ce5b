//! Request and response values shared by the cache, the queue and the transport.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// HTTP method of a request descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
  Other(String),
}

impl Method {
  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Other(m) => m,
    }
  }

  pub fn is_get(&self) -> bool {
    matches!(self, Method::Get)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Method {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.to_ascii_uppercase().as_str() {
      "GET" => Method::Get,
      "POST" => Method::Post,
      "PUT" => Method::Put,
      "DELETE" => Method::Delete,
      other => Method::Other(other.to_string()),
    })
  }
}

impl From<String> for Method {
  fn from(s: String) -> Self {
    match s.parse() {
      Ok(method) => method,
      Err(never) => match never {},
    }
  }
}

impl From<Method> for String {
  fn from(method: Method) -> Self {
    method.as_str().to_string()
  }
}

/// Header map. Ordered so that serialized descriptors are stable.
pub type Headers = BTreeMap<String, String>;

/// Everything needed to send (or replay) a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
  pub method: Method,
  pub url: Url,
  #[serde(default)]
  pub headers: Headers,
  pub body: Option<String>,
}

impl RequestDescriptor {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Headers::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::Get, url)
  }

  /// Attach a JSON body and the matching content type.
  pub fn with_json(mut self, body: String) -> Self {
    self
      .headers
      .insert("Content-Type".to_string(), "application/json".to_string());
    self.body = Some(body);
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_string(), value.to_string());
    self
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }
}

/// A response as seen by the cache and sync layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: Headers,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Headers::new(),
      body: body.into(),
    }
  }

  /// A JSON response with the given status.
  pub fn json(status: u16, body: impl Into<Vec<u8>>) -> Self {
    let mut response = Self::new(status, body);
    response
      .headers
      .insert("Content-Type".to_string(), "application/json".to_string());
    response
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

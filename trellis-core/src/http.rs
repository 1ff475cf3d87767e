//! Request, response and reply types shared by handlers and core functions

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// HTTP methods an endpoint can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            _ => Err(crate::Error::UnknownMethod(s.to_string())),
        }
    }
}

/// A file received in a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// An incoming request as seen by handlers.
///
/// Header names are stored lowercase.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub route_params: Map<String, Value>,
    pub query_params: Map<String, Value>,
    pub body: Value,
    pub raw_body: Bytes,
    pub files: HashMap<String, UploadedFile>,
}

impl Request {
    /// Create a request; a query string in `path` fills `query_params`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let query_params = path
            .split_once('?')
            .map(|(_, query)| parse_query_string(query))
            .unwrap_or_default();
        Self {
            method,
            path,
            headers: HashMap::new(),
            route_params: Map::new(),
            query_params,
            body: Value::Null,
            raw_body: Bytes::new(),
            files: HashMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// The path without its query string
    pub fn path_only(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Set a JSON body, keeping `raw_body` in sync.
    pub fn with_json(mut self, body: Value) -> Self {
        self.raw_body = Bytes::from(body.to_string());
        self.body = body;
        self.with_header("content-type", "application/json")
    }

    /// Set raw bytes as the body; `body` stays as it was.
    pub fn with_raw_body(mut self, content_type: &str, raw: impl Into<Bytes>) -> Self {
        self.raw_body = raw.into();
        self.with_header("content-type", content_type)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// JSON view of the request, validated by `request` parameter schemas.
    pub fn to_value(&self) -> Value {
        json!({
            "method": self.method,
            "path": self.path_only(),
            "headers": self.headers,
            "route_params": self.route_params,
            "query_params": self.query_params,
            "body": self.body,
        })
    }
}

/// Parse a query string; repeated keys collect into an array.
pub fn parse_query_string(query: &str) -> Map<String, Value> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    let mut params = Map::new();
    for (key, value) in pairs {
        match params.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                params.insert(key, Value::String(value));
            }
        }
    }
    params
}

/// Body of a rendered response.
pub enum ResponseBody {
    Empty,
    Bytes(Bytes),
    Stream(BoxStream<'static, Bytes>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            ResponseBody::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// The canonical response understood by the surrounding server.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    /// A JSON response with the given status.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Bytes(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Buffered body bytes; `None` for streams.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Empty => Some(&[][..]),
            ResponseBody::Bytes(bytes) => Some(bytes.as_ref()),
            ResponseBody::Stream(_) => None,
        }
    }

    /// Parse a buffered body as JSON
    pub fn json_body(&self) -> Option<Value> {
        self.body_bytes()
            .filter(|bytes| !bytes.is_empty())
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.body, ResponseBody::Stream(_))
    }

    /// Drain the body, collecting a stream if necessary.
    pub async fn collect_body(self) -> Bytes {
        match self.body {
            ResponseBody::Empty => Bytes::new(),
            ResponseBody::Bytes(bytes) => bytes,
            ResponseBody::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.collect().await;
                Bytes::from(chunks.concat())
            }
        }
    }
}

/// What an endpoint body produces.
pub enum Reply {
    Value(Value),
    Response(Response),
    Stream {
        content_type: String,
        stream: BoxStream<'static, Bytes>,
    },
}

impl Reply {
    pub fn null() -> Self {
        Reply::Value(Value::Null)
    }

    pub fn stream<S>(content_type: impl Into<String>, stream: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        Reply::Stream {
            content_type: content_type.into(),
            stream: stream.boxed(),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Reply::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Normalize into a [`Response`].
    ///
    /// `null` renders as 204, other values as 200 JSON.
    pub fn render(self) -> Response {
        match self {
            Reply::Value(Value::Null) => Response::no_content(),
            Reply::Value(value) => Response::json(200, &value),
            Reply::Response(response) => response,
            Reply::Stream {
                content_type,
                stream,
            } => Response {
                status: 200,
                headers: HashMap::from([("content-type".to_string(), content_type)]),
                body: ResponseBody::Stream(stream),
            },
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Reply::Response(response) => f.debug_tuple("Response").field(response).finish(),
            Reply::Stream { content_type, .. } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("PATCH".parse::<Method>().unwrap(), Method::Patch);
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[test]
    fn test_request_parses_query_string() {
        let request = Request::get("/users?page=2&tag=a&tag=b&q=hello+world");
        assert_eq!(request.path_only(), "/users");
        assert_eq!(request.query_params["page"], "2");
        assert_eq!(request.query_params["tag"], json!(["a", "b"]));
        assert_eq!(request.query_params["q"], "hello world");
    }

    #[test]
    fn test_request_headers_are_case_insensitive() {
        let request = Request::get("/").with_header("X-Trace", "abc");
        assert_eq!(request.header("x-trace"), Some("abc"));
        assert_eq!(request.header("X-TRACE"), Some("abc"));
    }

    #[test]
    fn test_request_to_value() {
        let request = Request::post("/items?x=1").with_json(json!({"name": "a"}));
        let value = request.to_value();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["path"], "/items");
        assert_eq!(value["body"]["name"], "a");
        assert_eq!(value["headers"]["content-type"], "application/json");
    }

    #[test]
    fn test_render_null_is_no_content() {
        let response = Reply::null().render();
        assert_eq!(response.status, 204);
        assert_eq!(response.body_bytes(), Some(&[][..]));
    }

    #[test]
    fn test_render_value_is_json() {
        let response = Reply::from(json!({"id": 1})).render();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.json_body(), Some(json!({"id": 1})));
    }

    #[test]
    fn test_render_response_passes_through() {
        let response = Reply::from(Response::created().with_body("done")).render();
        assert_eq!(response.status, 201);
        assert_eq!(response.body_bytes(), Some(&b"done"[..]));
    }

    #[tokio::test]
    async fn test_render_stream() {
        let reply = Reply::stream(
            "text/plain",
            stream::iter(vec![Bytes::from("a"), Bytes::from("b")]),
        );
        let response = reply.render();
        assert!(response.is_stream());
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.collect_body().await, Bytes::from("ab"));
    }
}

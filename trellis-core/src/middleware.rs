//! Handler middleware and multipart form support

use crate::callbacks::{Raise, Respond};
use crate::error::EndpointError;
use crate::handler::Handler;
use crate::http::{Request, UploadedFile};
use bytes::Bytes;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

/// Wraps a handler into another handler.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Build middleware from a closure
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Fold middleware around a handler; the first entry ends up innermost.
pub fn apply(handler: Handler, chain: &[Middleware]) -> Handler {
    chain.iter().fold(handler, |inner, wrap| wrap(inner))
}

/// Multipart form field
#[derive(Debug, Clone)]
pub struct FormField {
    pub name: String,
    /// Text value (for non-file fields)
    pub value: Option<String>,
    pub file: Option<UploadedFile>,
}

/// `multipart/form-data` body parser
pub struct MultipartParser {
    boundary: String,
}

impl MultipartParser {
    /// Create a parser from the `Content-Type` header
    pub fn from_content_type(content_type: &str) -> Result<Self, EndpointError> {
        // multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW
        let boundary = content_type
            .split(';')
            .find_map(|part| {
                part.trim()
                    .strip_prefix("boundary=")
                    .map(|b| b.trim_matches('"').to_string())
            })
            .filter(|b| !b.is_empty())
            .ok_or_else(|| EndpointError::Multipart("missing boundary in content-type".to_string()))?;

        Ok(Self { boundary })
    }

    pub fn parse(&self, body: &[u8]) -> Result<Vec<FormField>, EndpointError> {
        let delimiter = format!("--{}", self.boundary);
        let delimiter = delimiter.as_bytes();
        let mut fields = Vec::new();

        let Some(mut start) = find(body, delimiter, 0) else {
            return Err(EndpointError::Multipart("no boundary found in body".to_string()));
        };
        loop {
            let part_start = start + delimiter.len();
            if body[part_start..].starts_with(b"--") {
                break;
            }
            let Some(end) = find(body, delimiter, part_start) else {
                return Err(EndpointError::Multipart("unterminated part".to_string()));
            };
            if let Some(field) = parse_part(&body[part_start..end])? {
                fields.push(field);
            }
            start = end;
        }

        Ok(fields)
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

fn trim_newline_start(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\r").unwrap_or(bytes);
    bytes.strip_prefix(b"\n").unwrap_or(bytes)
}

fn trim_newline_end(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

fn parse_part(part: &[u8]) -> Result<Option<FormField>, EndpointError> {
    let part = trim_newline_start(part);
    if part.is_empty() {
        return Ok(None);
    }

    let (head, content) = match find(part, b"\r\n\r\n", 0) {
        Some(i) => (&part[..i], &part[i + 4..]),
        None => match find(part, b"\n\n", 0) {
            Some(i) => (&part[..i], &part[i + 2..]),
            None => (part, &b""[..]),
        },
    };
    let content = trim_newline_end(content);

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in String::from_utf8_lossy(head).lines() {
        let Some((header, value)) = line.split_once(':') else {
            continue;
        };
        match header.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                for attr in value.split(';') {
                    let attr = attr.trim();
                    if let Some(v) = attr.strip_prefix("name=") {
                        name = Some(v.trim_matches('"').to_string());
                    } else if let Some(v) = attr.strip_prefix("filename=") {
                        filename = Some(v.trim_matches('"').to_string());
                    }
                }
            }
            "content-type" => content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| EndpointError::Multipart("part without a field name".to_string()))?;

    Ok(Some(match filename {
        Some(filename) => FormField {
            name,
            value: None,
            file: Some(UploadedFile {
                filename,
                content_type: content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data: Bytes::copy_from_slice(content),
            }),
        },
        None => FormField {
            name,
            value: Some(String::from_utf8_lossy(content).into_owned()),
            file: None,
        },
    }))
}

fn is_multipart(request: &Request) -> bool {
    request
        .content_type()
        .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// Parse a multipart body into `request.body` and `request.files`.
///
/// Text fields become strings; file fields become
/// `{filename, content_type, size}` with the bytes in `files`.
pub fn parse_multipart(request: &mut Request) -> Result<(), EndpointError> {
    let content_type = request.content_type().unwrap_or_default().to_string();
    let fields = MultipartParser::from_content_type(&content_type)?.parse(&request.raw_body)?;

    let mut body = Map::new();
    for field in fields {
        let value = match (field.value, field.file) {
            (_, Some(file)) => {
                let summary = json!({
                    "filename": file.filename,
                    "content_type": file.content_type,
                    "size": file.size(),
                });
                request.files.insert(field.name.clone(), file);
                summary
            }
            (Some(text), None) => Value::String(text),
            (None, None) => Value::Null,
        };
        match body.get_mut(&field.name) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                body.insert(field.name, value);
            }
        }
    }
    request.body = Value::Object(body);
    Ok(())
}

/// Middleware parsing `multipart/form-data` bodies before the handler.
///
/// Other content types pass through untouched; a malformed body is
/// delivered to `raise`.
pub fn multipart() -> Middleware {
    middleware(|next: Handler| -> Handler {
        Arc::new(move |mut request: Request, respond: Respond, raise: Raise| {
            if !is_multipart(&request) {
                return next(request, respond, raise);
            }
            match parse_multipart(&mut request) {
                Ok(()) => {
                    debug!(files = request.files.len(), "parsed multipart body");
                    next(request, respond, raise)
                }
                Err(error) => {
                    raise.call(error);
                    Ok(())
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "XyZ";

    fn form_body() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"--XyZ\r\n");
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"title\"\r\n\r\n");
        body.extend_from_slice(b"Holiday\r\n");
        body.extend_from_slice(b"--XyZ\r\n");
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"photo\"; filename=\"a.png\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x00]);
        body.extend_from_slice(b"\r\n--XyZ--\r\n");
        body
    }

    #[test]
    fn test_parser_requires_boundary() {
        assert!(MultipartParser::from_content_type("multipart/form-data").is_err());
        assert!(MultipartParser::from_content_type("multipart/form-data; boundary=\"abc\"").is_ok());
    }

    #[test]
    fn test_parse_text_and_binary_file() {
        let parser = MultipartParser::from_content_type(&format!(
            "multipart/form-data; boundary={}",
            BOUNDARY
        ))
        .unwrap();
        let fields = parser.parse(&form_body()).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "title");
        assert_eq!(fields[0].value.as_deref(), Some("Holiday"));

        let file = fields[1].file.as_ref().unwrap();
        assert_eq!(file.filename, "a.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(&file.data[..], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x00]);
    }

    #[test]
    fn test_nameless_part_is_rejected() {
        let parser = MultipartParser::from_content_type("multipart/form-data; boundary=b").unwrap();
        let body = b"--b\r\nContent-Disposition: form-data\r\n\r\nx\r\n--b--\r\n";
        assert!(matches!(parser.parse(body), Err(EndpointError::Multipart(_))));
    }

    #[test]
    fn test_parse_multipart_fills_request() {
        let mut request = Request::post("/upload").with_raw_body(
            &format!("multipart/form-data; boundary={}", BOUNDARY),
            form_body(),
        );
        parse_multipart(&mut request).unwrap();
        assert_eq!(request.body["title"], "Holiday");
        assert_eq!(request.body["photo"]["filename"], "a.png");
        assert_eq!(request.body["photo"]["size"], 7);
        assert_eq!(request.files["photo"].size(), 7);
    }
}

//! Line-delimited JSON protocol
//!
//! Every request and response is one JSON object on one line.
//!
//! Request (stdin):
//! - `{"chunks": ["text", ...]}` (a bare string is accepted as one chunk)
//!
//! Response (stdout), exactly one per request line:
//! - `{"count": N, "embedding_dim": D, "embeddings": [[...], ...], "success": true}`
//! - `{"error": "...", "traceback": "..."}` (`traceback` only when there is detail)
//!
//! Status events (stderr) are in [`status`].

pub mod status;

use serde::{Deserialize, Serialize};

use crate::models::Embedding;

pub use status::StatusEvent;

/// Error text for requests without any chunk
pub const NO_CHUNKS: &str = "No chunks provided";

/// Embedding request line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedRequest {
    /// Texts to embed; other fields of the line are ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Chunks>,
}

/// The `chunks` field: a list of texts, or one text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Chunks {
    Many(Vec<String>),
    One(String),
}

impl Chunks {
    pub fn len(&self) -> usize {
        match self {
            Chunks::Many(texts) => texts.len(),
            Chunks::One(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Chunks::Many(texts) => texts.is_empty(),
            Chunks::One(text) => text.is_empty(),
        }
    }
}

/// Parse one request line into its chunk list.
///
/// Fails with the error response to write back when the line is not JSON,
/// not an object, has no chunks, or has chunks of the wrong type. Any empty
/// or zero-like `chunks` value (`null`, `false`, `0`, `""`, `[]`, `{}`)
/// counts as no chunks.
pub fn parse_request(line: &str) -> Result<Chunks, ErrorResponse> {
    let value: serde_json::Value = serde_json::from_str(line.trim())
        .map_err(|e| ErrorResponse::new(format!("JSON decode error: {}", e)))?;

    let Some(object) = value.as_object() else {
        return Err(ErrorResponse::processing("request must be a JSON object"));
    };
    if object.get("chunks").map_or(true, is_blank) {
        return Err(ErrorResponse::new(NO_CHUNKS));
    }

    let request = EmbedRequest::deserialize(&value).map_err(|e| {
        ErrorResponse::processing(format!("chunks must be a string or a list of strings ({})", e))
    })?;

    match request.chunks {
        Some(chunks) if !chunks.is_empty() => Ok(chunks),
        _ => Err(ErrorResponse::new(NO_CHUNKS)),
    }
}

fn is_blank(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// What the model produced for one request, before shape normalization
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// One-dimensional result of a single-text encode
    Single(Embedding),
    /// One row per chunk
    Batch(Vec<Embedding>),
}

impl Encoded {
    /// Uniform `count x dim` rows
    pub fn into_rows(self) -> Vec<Embedding> {
        match self {
            Encoded::Single(row) => vec![row],
            Encoded::Batch(rows) => rows,
        }
    }
}

/// Response line: success or error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedResponse {
    Success(EmbedSuccess),
    Error(ErrorResponse),
}

impl EmbedResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, EmbedResponse::Success(_))
    }

    /// Serialize as one line, newline included
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl From<Result<EmbedSuccess, ErrorResponse>> for EmbedResponse {
    fn from(outcome: Result<EmbedSuccess, ErrorResponse>) -> Self {
        match outcome {
            Ok(success) => EmbedResponse::Success(success),
            Err(error) => EmbedResponse::Error(error),
        }
    }
}

/// Successful embedding response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedSuccess {
    pub count: usize,
    pub embedding_dim: usize,
    pub embeddings: Vec<Embedding>,
    pub success: bool,
}

impl EmbedSuccess {
    /// Build a response for `count` chunks, checking that the model returned
    /// one row per chunk and that all rows share a dimension.
    pub fn from_encoded(count: usize, encoded: Encoded) -> Result<Self, String> {
        let embeddings = encoded.into_rows();
        if embeddings.len() != count {
            return Err(format!(
                "model returned {} embeddings for {} chunks",
                embeddings.len(),
                count
            ));
        }

        let embedding_dim = embeddings.first().map_or(0, Vec::len);
        if let Some(bad) = embeddings.iter().position(|row| row.len() != embedding_dim) {
            return Err(format!(
                "embedding {} has dimension {}, expected {}",
                bad,
                embeddings[bad].len(),
                embedding_dim
            ));
        }

        Ok(Self {
            count,
            embedding_dim,
            embeddings,
            success: true,
        })
    }
}

/// Error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            traceback: None,
        }
    }

    /// Request-shape failure other than bad JSON or missing chunks
    pub fn processing(message: impl std::fmt::Display) -> Self {
        Self::new(format!("Processing error: {}", message))
    }

    /// Model encode failure
    pub fn encoding(message: impl std::fmt::Display) -> Self {
        Self::new(format!("Encoding failed: {}", message))
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_list() {
        let chunks = parse_request(r#"{"chunks": ["a", "b"], "source": "indexer"}"#).unwrap();
        assert_eq!(chunks, Chunks::Many(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_parse_single_string_chunk() {
        let chunks = parse_request("{\"chunks\": \"hello world\"}\r\n").unwrap();
        assert_eq!(chunks, Chunks::One("hello world".to_string()));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_missing_or_empty_chunks() {
        for line in [r#"{}"#, r#"{"chunks": []}"#, r#"{"chunks": null}"#, r#"{"chunks": ""}"#] {
            let err = parse_request(line).unwrap_err();
            assert_eq!(err, ErrorResponse::new(NO_CHUNKS), "line {line}");
        }
    }

    #[test]
    fn test_zero_like_chunks_count_as_missing() {
        for line in [r#"{"chunks": 0}"#, r#"{"chunks": 0.0}"#, r#"{"chunks": false}"#, r#"{"chunks": {}}"#] {
            let err = parse_request(line).unwrap_err();
            assert_eq!(err, ErrorResponse::new(NO_CHUNKS), "line {line}");
        }

        for line in [r#"{"chunks": 3}"#, r#"{"chunks": true}"#, r#"{"chunks": {"a": "b"}}"#] {
            let err = parse_request(line).unwrap_err();
            assert!(err.error.starts_with("Processing error: chunks must be"), "line {line}");
        }
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_request(r#"{"chunks": ["a""#).unwrap_err();
        assert!(err.error.starts_with("JSON decode error: "));
        assert!(err.traceback.is_none());

        let err = parse_request("").unwrap_err();
        assert!(err.error.starts_with("JSON decode error: "));
    }

    #[test]
    fn test_non_object_request() {
        let err = parse_request(r#"[["a"]]"#).unwrap_err();
        assert_eq!(err.error, "Processing error: request must be a JSON object");
    }

    #[test]
    fn test_wrong_chunk_types() {
        let err = parse_request(r#"{"chunks": [1, 2]}"#).unwrap_err();
        assert!(err.error.starts_with("Processing error: chunks must be"));
    }

    #[test]
    fn test_single_result_is_normalized_to_one_row() {
        let success = EmbedSuccess::from_encoded(1, Encoded::Single(vec![0.1, 0.2, 0.3])).unwrap();
        assert_eq!(success.count, 1);
        assert_eq!(success.embedding_dim, 3);
        assert_eq!(success.embeddings, vec![vec![0.1, 0.2, 0.3]]);
    }

    #[test]
    fn test_row_count_must_match_chunks() {
        let err = EmbedSuccess::from_encoded(3, Encoded::Batch(vec![vec![1.0], vec![2.0]])).unwrap_err();
        assert_eq!(err, "model returned 2 embeddings for 3 chunks");
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = EmbedSuccess::from_encoded(2, Encoded::Batch(vec![vec![1.0, 2.0], vec![3.0]])).unwrap_err();
        assert!(err.starts_with("embedding 1 has dimension 1"));
    }

    #[test]
    fn test_empty_result_has_zero_dim() {
        let success = EmbedSuccess::from_encoded(0, Encoded::Batch(Vec::new())).unwrap();
        assert_eq!(success.embedding_dim, 0);
    }

    #[test]
    fn test_success_wire_format() {
        let success = EmbedSuccess::from_encoded(1, Encoded::Batch(vec![vec![0.5, -1.0]])).unwrap();
        let line = EmbedResponse::Success(success).to_line().unwrap();
        assert_eq!(
            line,
            "{\"count\":1,\"embedding_dim\":2,\"embeddings\":[[0.5,-1.0]],\"success\":true}\n"
        );
    }

    #[test]
    fn test_error_wire_format() {
        let line = EmbedResponse::Error(ErrorResponse::new(NO_CHUNKS)).to_line().unwrap();
        assert_eq!(line, "{\"error\":\"No chunks provided\"}\n");

        let err = ErrorResponse::encoding("boom").with_traceback("boom\nCaused by: cuda oom");
        let json: serde_json::Value = serde_json::from_str(&EmbedResponse::Error(err).to_line().unwrap()).unwrap();
        assert_eq!(json["error"], "Encoding failed: boom");
        assert_eq!(json["traceback"], "boom\nCaused by: cuda oom");
    }

    #[test]
    fn test_response_parses_back_by_shape() {
        let ok: EmbedResponse = serde_json::from_str(r#"{"count":0,"embedding_dim":0,"embeddings":[],"success":true}"#).unwrap();
        assert!(ok.is_success());
        let err: EmbedResponse = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert!(!err.is_success());
    }
}

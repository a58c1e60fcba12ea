//! Fetched documents
//!
//! `Data` is what a single request resolves to. It is never absent: a request
//! that produced nothing usable yields an empty `Data` rather than an error.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[[:cntrl:]]").unwrap());

/// Body and status of one fetched document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    body: Vec<u8>,
    status: u16,
}

impl Default for Data {
    fn default() -> Self {
        Self {
            body: Vec::new(),
            status: 200,
        }
    }
}

impl Data {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(body, 200)
    }

    pub fn with_status(body: impl Into<Vec<u8>>, status: u16) -> Self {
        Self {
            body: body.into(),
            status,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Returns the body as text, replacing invalid UTF-8 sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON
    ///
    /// Control characters are stripped first; vendor APIs routinely embed raw
    /// newlines inside string values. A body that still fails to parse is
    /// logged and yields `None`.
    pub fn json(&self) -> Option<serde_json::Value> {
        let text = self.text();
        let cleaned = CONTROL_CHARS.replace_all(&text, "");
        match serde_json::from_str(&cleaned) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Data json decode failed: {}", e);
                None
            }
        }
    }
}

impl From<&str> for Data {
    fn from(body: &str) -> Self {
        Data::new(body)
    }
}

/// A fetched document together with the link that produced it
#[derive(Debug, Clone)]
pub struct FetchedLink {
    pub url: String,
    pub params: IndexMap<String, String>,
    pub data: Data,
}

/// Result of a batch fetch
#[derive(Debug, Clone)]
pub enum FetchOutput {
    /// Documents keyed by identity URL; a repeated URL keeps the last document
    ByUrl(IndexMap<String, Data>),
    /// One entry per resolved request, with link details
    List(Vec<FetchedLink>),
}

impl FetchOutput {
    pub fn len(&self) -> usize {
        match self {
            Self::ByUrl(map) => map.len(),
            Self::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens either shape into `(url, data)` pairs in result order
    pub fn into_pairs(self) -> Vec<(String, Data)> {
        match self {
            Self::ByUrl(map) => map.into_iter().collect(),
            Self::List(list) => list.into_iter().map(|f| (f.url, f.data)).collect(),
        }
    }

    /// Returns the first document, used by single-link helpers
    pub fn into_first(self) -> Data {
        self.into_pairs()
            .into_iter()
            .next()
            .map(|(_, data)| data)
            .unwrap_or_default()
    }
}

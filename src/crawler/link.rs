//! Crawl links
//!
//! A `Link` is one unit of fetch work: a URL, an HTTP method and an ordered
//! parameter list. For GET links the parameters travel in the query string
//! and are part of the link's identity.

use indexmap::IndexMap;
use std::fmt;

/// HTTP method of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    /// Parses a method name case-insensitively; anything but POST is GET
    pub fn parse(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("post") {
            Self::Post
        } else {
            Self::Get
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a link's parameters are encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamEncoding {
    /// Query string for GET, form body for POST
    #[default]
    Default,
    /// `application/x-www-form-urlencoded` body
    Form,
    /// JSON request body
    Json,
}

/// One addressable unit of crawl work
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    url: String,
    method: Method,
    params: IndexMap<String, String>,
    encoding: ParamEncoding,
    visited: bool,
}

impl Link {
    /// Creates a GET link, moving any query string into the parameter list
    ///
    /// # Examples
    ///
    /// ```
    /// use vendor_feed::crawler::Link;
    ///
    /// let link = Link::new("https://example.com/list?page=2&sort=asc");
    /// assert_eq!(link.params().get("page").map(String::as_str), Some("2"));
    /// assert_eq!(link.url(), "https://example.com/list?page=2&sort=asc");
    /// ```
    pub fn new(url: impl AsRef<str>) -> Self {
        Self::with_params(url, Method::Get, IndexMap::new())
    }

    /// Creates a link with an explicit method and parameters
    ///
    /// For GET, query pairs found on `url` are appended after `params`;
    /// a query key that is already present overwrites its value in place.
    pub fn with_params(
        url: impl AsRef<str>,
        method: Method,
        mut params: IndexMap<String, String>,
    ) -> Self {
        let mut url = url.as_ref().to_string();

        if method == Method::Get {
            if let Some(start) = url.find('?') {
                let query = url[start + 1..].to_string();
                url.truncate(start);
                for (key, value) in parse_query(&query) {
                    params.insert(key, value);
                }
            }
        }

        Self {
            url: url.trim().to_string(),
            method,
            params,
            encoding: ParamEncoding::Default,
            visited: false,
        }
    }

    /// Creates a POST link with the given body parameters
    pub fn post(url: impl AsRef<str>, params: IndexMap<String, String>) -> Self {
        Self::with_params(url, Method::Post, params)
    }

    /// Sets the parameter encoding (builder style)
    pub fn encoded_as(mut self, encoding: ParamEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Returns the link's identity URL
    ///
    /// GET links with parameters render them back as `?k=v&k2=v2` in
    /// insertion order; POST links are identified by the bare URL.
    pub fn url(&self) -> String {
        if self.method == Method::Get && !self.params.is_empty() {
            let query = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            format!("{}?{}", self.url, query)
        } else {
            self.url.clone()
        }
    }

    /// Returns the URL without GET parameters
    pub fn base_url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    pub fn encoding(&self) -> ParamEncoding {
        self.encoding
    }

    pub fn is_visited(&self) -> bool {
        self.visited
    }

    /// Marks the link visited; the flag never goes back to false
    pub fn mark_visited(&mut self) {
        self.visited = true;
    }
}

impl From<&str> for Link {
    fn from(url: &str) -> Self {
        Link::new(url)
    }
}

impl From<String> for Link {
    fn from(url: String) -> Self {
        Link::new(url)
    }
}

/// Splits `a=1&b=2` into ordered pairs, skipping fragments without `=`
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if value.contains('=') {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

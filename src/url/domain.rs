use crate::LinkError;
use url::Url;

/// Extracts the lowercase host from a URL
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Parses a vendor source URL, which must be http or https
pub fn parse_source(source: &str) -> Result<Url, LinkError> {
    let url = Url::parse(source).map_err(|e| LinkError::Parse(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LinkError::InvalidScheme(other.to_string())),
    }
}

/// Returns the vendor's cookie domain: the source host without a `www.` prefix
///
/// Cookies installed by hand are set for both this domain and its `www.`
/// variant.
///
/// # Examples
///
/// ```
/// use vendor_feed::url::cookie_domain;
///
/// assert_eq!(cookie_domain("https://www.example.com/shop").unwrap(), "example.com");
/// assert_eq!(cookie_domain("http://127.0.0.1:8080/").unwrap(), "127.0.0.1");
/// ```
pub fn cookie_domain(source: &str) -> Result<String, LinkError> {
    let url = parse_source(source)?;
    let host = extract_domain(&url).ok_or(LinkError::MissingDomain)?;
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

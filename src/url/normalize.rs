use crate::url::domain::parse_source;
use crate::LinkError;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static DOMAIN_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?P<protocol>(?:ht|f)tps?)://)?(?P<domain>[\p{L}\d.-]+\.\p{L}{2,4})")
        .expect("static regex")
});

/// Resolves a link href against the page it was found on
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - invalid URLs
/// - non-HTTP(S) URLs after resolution
///
/// The fragment of the resolved URL is dropped so that `/p#reviews` and
/// `/p` land on the same frontier entry.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(mut absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                absolute_url.set_fragment(None);
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Turns a (possibly relative or scheme-less) asset link into an absolute URL
///
/// Dot segments and backslashes are dropped, a bare domain gets the source's
/// scheme, and a path gets the source's scheme and host.
///
/// # Arguments
///
/// * `link` - The asset link as found in the page
/// * `source` - The vendor source URL
///
/// # Examples
///
/// ```
/// use vendor_feed::url::normalize_src_link;
///
/// let src = normalize_src_link("../img/a.jpg", "https://example.com/shop").unwrap();
/// assert_eq!(src, "https://example.com/img/a.jpg");
/// ```
pub fn normalize_src_link(link: &str, source: &str) -> Result<String, LinkError> {
    let cleared = link
        .replace("../", "")
        .replace("./", "")
        .replace('\\', "");
    let cleared = cleared.trim_start_matches('/');

    let source = parse_source(source)?;
    let host = source.host_str().ok_or(LinkError::MissingDomain)?;

    match DOMAIN_PREFIX.captures(cleared) {
        None => Ok(format!("{}://{}/{}", source.scheme(), host, cleared)),
        Some(caps) if caps.name("protocol").is_none() => {
            Ok(format!("{}://{}", source.scheme(), cleared))
        }
        Some(_) => Ok(cleared.to_string()),
    }
}

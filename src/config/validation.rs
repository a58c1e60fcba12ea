use crate::config::types::{AuthConfig, CrawlConfig, DebugConfig, VendorConfig, VendorInfo};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &VendorConfig) -> Result<(), ConfigError> {
    validate_vendor_info(&config.vendor)?;
    validate_crawl_config(&config.crawl)?;
    if let Some(auth) = &config.auth {
        validate_auth_config(auth)?;
    }
    validate_debug_config(&config.debug)?;
    if let Some(parser) = &config.parser {
        let selectors = [
            &parser.product,
            &parser.mpn,
            &parser.brand,
            &parser.cost,
            &parser.list_price,
            &parser.description,
            &parser.short_description,
            &parser.images,
            &parser.categories,
            &parser.upc,
            &parser.avail,
            &parser.attributes,
        ];
        for selector in selectors.into_iter().flatten() {
            validate_selector(selector)?;
        }
    }
    Ok(())
}

/// Validates vendor identity
fn validate_vendor_info(vendor: &VendorInfo) -> Result<(), ConfigError> {
    if vendor.supplier_id == 0 {
        return Err(ConfigError::Validation(
            "supplier_id must be greater than 0".to_string(),
        ));
    }

    if vendor.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "vendor name cannot be empty".to_string(),
        ));
    }

    if vendor.prefix.trim().is_empty() {
        return Err(ConfigError::Validation(
            "vendor prefix cannot be empty".to_string(),
        ));
    }

    validate_http_url("source", &vendor.source)?;

    Ok(())
}

/// Validates crawl behavior configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.chunk_size < 1 || config.chunk_size > 500 {
        return Err(ConfigError::Validation(format!(
            "chunk_size must be between 1 and 500, got {}",
            config.chunk_size
        )));
    }

    if config.max_in_flight < 1 || config.max_in_flight > 100 {
        return Err(ConfigError::Validation(format!(
            "max_in_flight must be between 1 and 100, got {}",
            config.max_in_flight
        )));
    }

    if config.request_timeout_s < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_s must be >= 1, got {}",
            config.request_timeout_s
        )));
    }

    if !config.delay_s.is_finite() || config.delay_s < 0.0 {
        return Err(ConfigError::Validation(format!(
            "delay_s must be a non-negative number, got {}",
            config.delay_s
        )));
    }

    for seed in &config.seeds {
        validate_http_url("seed", seed)?;
    }

    for selector in config
        .category_selectors
        .iter()
        .chain(config.product_selectors.iter())
    {
        validate_selector(selector)?;
    }

    Ok(())
}

/// Validates the login flow configuration
fn validate_auth_config(auth: &AuthConfig) -> Result<(), ConfigError> {
    validate_http_url("login_url", &auth.login_url)?;

    if let Some(form_url) = &auth.form_url {
        validate_http_url("form_url", form_url)?;
    }

    if auth.credentials.is_empty() {
        return Err(ConfigError::Validation(
            "auth credentials cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates development-only settings
fn validate_debug_config(debug: &DebugConfig) -> Result<(), ConfigError> {
    if debug.max_products == Some(0) {
        return Err(ConfigError::Validation(
            "max_products must be greater than 0 when set".to_string(),
        ));
    }

    for url in &debug.custom_products {
        validate_http_url("custom product", url)?;
    }

    Ok(())
}

/// Validates that a URL parses and uses an HTTP(S) scheme
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

/// Validates a CSS selector
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("seed", "https://example.com/").is_ok());
        assert!(validate_http_url("seed", "http://127.0.0.1:8080/a").is_ok());

        assert!(validate_http_url("seed", "").is_err());
        assert!(validate_http_url("seed", "ftp://example.com/").is_err());
        assert!(validate_http_url("seed", "not a url").is_err());
    }

    #[test]
    fn test_validate_selector() {
        assert!(validate_selector("div.pager a").is_ok());
        assert!(validate_selector("tr.productListing-odd a:first-child").is_ok());

        assert!(matches!(
            validate_selector("div[["),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_validate_debug_config() {
        let debug = DebugConfig {
            max_products: Some(0),
            custom_products: vec![],
        };
        assert!(validate_debug_config(&debug).is_err());

        let debug = DebugConfig {
            max_products: Some(5),
            custom_products: vec!["https://example.com/p/1".to_string()],
        };
        assert!(validate_debug_config(&debug).is_ok());
    }
}

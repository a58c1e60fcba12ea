//! Vendor login flow
//!
//! Runs once when the downloader is built. Any failure is logged and the crawl
//! continues without a session.

use crate::config::{AuthConfig, AuthPayload};
use crate::crawler::downloader::Downloader;
use crate::crawler::link::ParamEncoding;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

const CHALLENGE_MARKER: &str = "sucuri_cloudproxy_js";

static CHALLENGE_COOKIE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(sucuri_cloudproxy_uuid_[0-9a-f]+)=([0-9a-f]+)").unwrap());

/// Logs in with the configured credentials
///
/// # Returns
///
/// `true` when the success marker was found on the resulting page (or no
/// marker is configured), `false` otherwise.
pub async fn authenticate(downloader: &mut Downloader, auth: &AuthConfig) -> bool {
    let mut params = auth.credentials.clone();

    if auth.find_form_fields {
        let form_url = auth.form_url.as_deref().unwrap_or(&auth.login_url);
        match downloader.get(form_url, IndexMap::new()).await {
            Ok(page) => {
                let field = auth
                    .credentials
                    .keys()
                    .next()
                    .map(String::as_str)
                    .unwrap_or("");
                params = find_form_fields(&page.text(), field, params);
            }
            Err(e) => tracing::warn!("Failed to load login form {}: {}", form_url, e),
        }
    }

    let encoding = match auth.payload {
        AuthPayload::Form => ParamEncoding::Form,
        AuthPayload::Json => ParamEncoding::Json,
    };

    let mut page = match downloader
        .post(&auth.login_url, params.clone(), encoding)
        .await
    {
        Ok(page) => page.text(),
        Err(e) => {
            tracing::warn!("Authorization request failed: {}", e);
            return false;
        }
    };

    if page.to_lowercase().contains(CHALLENGE_MARKER) {
        if let Some((name, value)) = challenge_cookie(&page) {
            tracing::debug!("Anti-bot challenge detected, installing cookie {}", name);
            if let Err(e) = downloader.session().set_cookie(&name, &value) {
                tracing::warn!("Failed to install challenge cookie: {}", e);
            }
            match downloader.post(&auth.login_url, params, encoding).await {
                Ok(retry) => page = retry.text(),
                Err(e) => {
                    tracing::warn!("Authorization retry failed: {}", e);
                    return false;
                }
            }
        }
    }

    let success = check_login(&page, auth.success_marker.as_deref());
    if success {
        tracing::info!("Authorization successful");
    } else {
        tracing::warn!("Authorization failed, continuing without a session");
    }
    success
}

/// Collects the input fields of a login form
///
/// With a `field_name`, the form containing that input is used; otherwise
/// every input inside any form. Inputs already present in `params` with a
/// non-empty value are left alone.
pub fn find_form_fields(
    html: &str,
    field_name: &str,
    mut params: IndexMap<String, String>,
) -> IndexMap<String, String> {
    let document = Html::parse_document(html);
    let Ok(input) = Selector::parse("input") else {
        return params;
    };

    let mut collect = |form: ElementRef| {
        for element in form.select(&input) {
            let Some(name) = element.value().attr("name") else {
                continue;
            };
            if params.get(name).map_or(false, |v| !v.is_empty()) {
                continue;
            }
            let value = element.value().attr("value").unwrap_or("");
            params.insert(name.to_string(), value.to_string());
        }
    };

    if field_name.is_empty() {
        if let Ok(forms) = Selector::parse("form") {
            for form in document.select(&forms) {
                collect(form);
            }
        }
    } else {
        let Ok(field) = Selector::parse(&format!("input[name=\"{}\"]", field_name)) else {
            return params;
        };
        let form = document.select(&field).next().and_then(|element| {
            element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|ancestor| ancestor.value().name() == "form")
        });
        if let Some(form) = form {
            collect(form);
        }
    }

    params
}

/// Extracts the cookie pair set by the anti-bot challenge script
///
/// Only the plain `name=value` assignment form of the challenge is handled.
pub fn challenge_cookie(page: &str) -> Option<(String, String)> {
    let captures = CHALLENGE_COOKIE.captures(page)?;
    Some((captures[1].to_string(), captures[2].to_string()))
}

/// Checks the post-login page for the success marker, case-insensitively
pub fn check_login(page: &str, marker: Option<&str>) -> bool {
    let Some(marker) = marker.filter(|m| !m.trim().is_empty()) else {
        return true;
    };
    let document = Html::parse_document(page);
    let text: String = document.root_element().text().collect();
    text.to_lowercase().contains(&marker.to_lowercase())
}

//! String helpers for product data
//!
//! Whitespace normalization, money and number extraction, UPC correction,
//! HTML cleanup and junk removal used while building and validating records.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\u{a0}]+").unwrap());
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());
static TAB_OR_CR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\t\r]+ *").unwrap());
static NEWLINE_INDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n +").unwrap());
static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").unwrap());

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|</?[a-zA-Z][^>]*>").unwrap());
static TAG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^</?([a-zA-Z][a-zA-Z0-9]*)").unwrap());
static TAG_ATTRIBUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(<[a-z][a-z0-9]*)([^>]*)(>)").unwrap());
static EMPTY_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<([a-z][a-z0-9]*)>\s*(?:<br>\s*)*</[a-z][a-z0-9]*>").unwrap()
});

static BLOCK_TAGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "noscript", "style", "video", "a", "iframe"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}(?:\s[^>]*)?>.*?</{tag}>")).unwrap())
        .collect()
});

/// Tags kept by `cut_tags` by default
pub const ALLOWED_TAGS: &[&str] = &[
    "span", "p", "br", "ol", "ul", "li", "table", "thead", "tbody", "th", "tr", "td",
];

static MONEY: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"\\u00a3", "&pound;", r"\$", "£"]
        .iter()
        .map(|currency| Regex::new(&format!(r"{currency}(\s+)?((\d+)?(\.?\d+))")).unwrap())
        .collect()
});

static MONEY_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)?(\.?\d+(\.?\d+)?)").unwrap());
static FLOAT_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+\s)?(\.?\d+(\.?/?\d+)?)").unwrap());

static JUNK: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // product codes and phone numbers
        r"(?is)Product Code(:)?(\s+)?.*?(\.|!|\?|\W)",
        r"(\s*)?(\+)?([- _():=+]?\d[- _():=+]?){10,14}(\s*)",
        // shipping
        r"(?i)([–-])?(\s+)?(\()?free shipping(\))?([.]|[!])?",
        r"(?is)ship(ping)? (methods)? (is)? free",
        r"(?is)drop ship(ping)?",
        // prices
        r"(?is)save((\s+)?(over)?)(\s+)?\$?(\d+(\.?\d+)?)",
        r"(?is)((map(-|s)?)(\s+)?(price(\s+)?)?)\$?(\s+)?(\d+(\.?\d+)?)",
        r"(?is)(retail)?(\s+)?price(:)?(\s+)?\$?(\d+(\.?\d+)?)",
        r"(?is)msrp(:)?(\s+)?\$?(\d+(\.?\d+)?)",
        r"(?i)\$(\d+(\.?\d+)?).*?price",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static DESCRIPTION_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let header = r"<(?:div|p|span|b|strong|h\d|em)>{key}(\s+)?((</\w+>)+)?:?(\s+)?</(?:div|p|span|b|strong|h\d|em)>(\s+)?((<\w+>)+)?((</\w+>)+)?((<\w+>)+)?(\s+)?";
    let lists = [
        r"(<(?:u|o)l>)?(\s+)?(?P<content_list><li>.*?</li>)(\s+)?</(?:u|o)l>",
        r"(?P<content_list><li>.*</li>)(\s+)?",
    ];
    let keys = [
        r"Dimension(s)?",
        r"Specification(s)?",
        r"(Key)?(\s+)?Benefit(s)?",
        r"(Key)?(\s+)?Feature(s)?",
        r"Detail(s)?",
    ];

    let mut regexes = Vec::new();
    for key in keys {
        let head = header.replace("{key}", key);
        for list in lists {
            regexes.push(Regex::new(&format!("(?is){head}{list}")).unwrap());
        }
    }
    regexes
});

static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<li>(.*?)</li>").unwrap());

/// Removes line breaks and collapses whitespace runs into single spaces
pub fn remove_spaces(s: &str) -> String {
    let without_newlines = s.replace('\n', "");
    WHITESPACE_RUN
        .replace_all(&without_newlines, " ")
        .trim()
        .to_string()
}

/// Collapses spaces, drops tabs and carriage returns, squeezes blank lines
pub fn normalize_space(s: &str) -> String {
    let s = s.replace('\u{a0}', " ");
    let s = SPACE_RUN.replace_all(s.trim(), " ");
    let s = TAB_OR_CR.replace_all(&s, "");
    let s = NEWLINE_INDENT.replace_all(&s, "\n");
    NEWLINE_RUN.replace_all(&s, "\n").into_owned()
}

/// True when the string has any non-whitespace content
pub fn is_not_empty(s: &str) -> bool {
    !remove_spaces(s).is_empty()
}

/// Upper-cases the first character
pub fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Upper-cases the first character of every space-separated word
pub fn ucwords(s: &str) -> String {
    s.split(' ').map(ucfirst).collect::<Vec<_>>().join(" ")
}

/// Rounds to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rounds to two places; anything not above 0.01 becomes `default`
pub fn normalize_float(value: Option<f64>, default: Option<f64>) -> Option<f64> {
    match value.map(round2) {
        Some(v) if v > 0.01 => Some(v),
        _ => default,
    }
}

/// Returns the first currency amount found in a string, e.g. `$12.99`
pub fn find_money(s: &str) -> Option<String> {
    MONEY
        .iter()
        .find_map(|regex| regex.find(s))
        .map(|m| m.as_str().to_string())
}

/// Extracts the first number from a price string; `0.0` when there is none
pub fn get_money(price: &str) -> f64 {
    let price = price.replace(',', "");
    MONEY_AMOUNT
        .find(&price)
        .and_then(|m| parse_leading_float(m.as_str()))
        .unwrap_or(0.0)
}

/// Extracts a decimal, mixed number (`1 1/2`) or vulgar fraction from text
pub fn get_float(s: &str, default: Option<f64>) -> Option<f64> {
    let s = s
        .replace('¼', "1/4")
        .replace('½', "1/2")
        .replace('¾', "3/4")
        .replace(',', "");

    let Some(captures) = FLOAT_AMOUNT.captures(s.trim()) else {
        return default;
    };

    let whole = captures
        .get(1)
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    let part = &captures[2];
    let fraction = match part.split_once('/') {
        Some((num, den)) => match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(num), Ok(den)) if den != 0.0 => num / den,
            _ => return default,
        },
        None => parse_leading_float(part).unwrap_or(0.0),
    };

    normalize_float(Some(whole + fraction), default)
}

fn parse_leading_float(s: &str) -> Option<f64> {
    if let Ok(value) = s.parse::<f64>() {
        return Some(value);
    }
    // "12.34.56" reads as 12.34
    let mut seen_dot = false;
    let prefix: String = s
        .chars()
        .take_while(|c| {
            if *c == '.' {
                if seen_dot {
                    return false;
                }
                seen_dot = true;
            }
            c.is_ascii_digit() || *c == '.'
        })
        .collect();
    prefix.parse().ok()
}

/// Corrects or rejects a UPC/EAN code
///
/// Non-digits are stripped first.
/// - 8 or 14 digits: a wrong check digit is replaced.
/// - 11 to 13 digits with a wrong check digit: ISBN-like codes (`978`/`979`
///   prefix, 12 or 13 digits) are rejected, others get a check digit appended.
/// - Any other length is rejected.
///
/// Rejection yields an empty string; a correct code is returned unchanged.
pub fn calculate_upc(raw: &str) -> String {
    let code: String = raw.chars().filter(char::is_ascii_digit).collect();

    match code.len() {
        8 | 14 => {
            let check = check_digit(&code);
            if last_digit(&code) == Some(check) {
                code
            } else {
                format!("{}{}", &code[..code.len() - 1], check)
            }
        }
        11..=13 => {
            if last_digit(&code) == Some(check_digit(&code)) {
                code
            } else if is_isbn_like(&code) {
                String::new()
            } else {
                let check = check_digit(&format!("{}1", code));
                format!("{}{}", code, check)
            }
        }
        _ => String::new(),
    }
}

/// Check digit for a code whose last position is the check slot
fn check_digit(code: &str) -> u32 {
    let digits: Vec<u32> = code.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 2 {
        return 0;
    }
    let sum: u32 = digits[..digits.len() - 1]
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();
    (10 - sum % 10) % 10
}

fn last_digit(code: &str) -> Option<u32> {
    code.chars().last().and_then(|c| c.to_digit(10))
}

fn is_isbn_like(code: &str) -> bool {
    matches!(code.len(), 12 | 13) && (code.starts_with("978") || code.starts_with("979"))
}

/// Decodes HTML character references
///
/// Numeric references and the named entities that show up in vendor copy
/// are handled; unknown names are left as they are.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    ENTITY
        .replace_all(s, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(entity)
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "pound" => '£',
        "euro" => '€',
        "cent" => '¢',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "deg" => '°',
        "frac14" => '¼',
        "frac12" => '½',
        "frac34" => '¾',
        "times" => '×',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "hellip" => '…',
        "bull" => '•',
        "middot" => '·',
        "prime" => '′',
        "Prime" => '″',
        _ => return None,
    };
    Some(c)
}

/// Removes every tag, keeping text content
pub fn strip_tags(s: &str) -> String {
    strip_tags_except(s, &[])
}

fn strip_tags_except(s: &str, allowed: &[&str]) -> String {
    ANY_TAG
        .replace_all(s, |caps: &Captures| {
            let tag = &caps[0];
            let keep = TAG_NAME
                .captures(tag)
                .map(|name| {
                    let name = name[1].to_lowercase();
                    allowed.iter().any(|a| *a == name)
                })
                .unwrap_or(false);
            if keep {
                tag.to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Drops every attribute from every opening tag
pub fn cut_tag_attributes(s: &str) -> String {
    TAG_ATTRIBUTES.replace_all(s, "$1$3").into_owned()
}

/// Removes script/style/video/anchor/iframe blocks with their content, then
/// strips every tag not in the keep list and clears attributes from the rest
///
/// # Arguments
///
/// * `s` - HTML fragment
/// * `keep_defaults` - Keep the `ALLOWED_TAGS` set
/// * `extra` - Additional tag names to keep
pub fn cut_tags(s: &str, keep_defaults: bool, extra: &[&str]) -> String {
    let mut out = s.to_string();
    for block in BLOCK_TAGS.iter() {
        out = block.replace_all(&out, "").into_owned();
    }

    let mut allowed: Vec<&str> = if keep_defaults {
        ALLOWED_TAGS.to_vec()
    } else {
        Vec::new()
    };
    allowed.extend_from_slice(extra);

    let stripped = strip_tags_except(out.trim(), &allowed);
    cut_tag_attributes(&stripped)
}

/// Removes tags that contain nothing but whitespace or `<br>`, repeatedly
pub fn cut_empty_tags(s: &str) -> String {
    let mut current = normalize_space(s);
    loop {
        let next = EMPTY_TAG
            .replace_all(&current, |caps: &Captures| {
                if caps[1].eq_ignore_ascii_case("br") {
                    caps[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Converts newlines to `<br />` line breaks
pub fn nl2br(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\n', "<br />\n")
}

/// Removes price, shipping, phone number and product code junk
///
/// With `replace` the matched fragments are removed; without it any match
/// clears the whole string.
pub fn cleaning(s: &str, extra: &[Regex], replace: bool) -> String {
    let mut out = s.to_string();
    for regex in JUNK.iter().chain(extra.iter()) {
        if regex.is_match(&out) {
            out = if replace {
                regex.replace_all(&out, "").into_owned()
            } else {
                String::new()
            };
        }
    }
    out
}

/// Applies `cleaning` to each text run of a fragment
///
/// Plain text is cleaned as a whole; for markup only the text between tags is
/// touched, so one junk sentence does not wipe the entire description.
pub fn clean_product_data(s: &str) -> String {
    if !remove_spaces(s).starts_with('<') {
        return cleaning(s, &[], false);
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for tag in ANY_TAG.find_iter(s) {
        out.push_str(&cleaning(&s[last..tag.start()], &[], false));
        out.push_str(tag.as_str());
        last = tag.end();
    }
    out.push_str(&cleaning(&s[last..], &[], false));
    out
}

/// Cleans a long product description
///
/// Junk text is removed, attributes stripped, `div` becomes `p`, unsafe blocks
/// and unknown tags are cut and empty tags dropped.
pub fn clean_description(description: &str) -> String {
    if !is_not_empty(description) {
        return description.to_string();
    }

    let cleaned = clean_product_data(description);
    let cleaned = cut_tag_attributes(&cleaned);
    let cleaned = decode_entities(&remove_spaces(&cleaned))
        .replace("<div>", "<p>")
        .replace("</div>", "</p>");
    cut_empty_tags(&cut_tags(&cleaned, true, &[]))
}

/// Cleans feature bullets and drops empty ones
pub fn clean_short_description(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| remove_spaces(&clean_product_data(item)))
        .filter(|item| is_not_empty(item))
        .collect()
}

/// Leftover feature and specification blocks found in a description
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DescriptionBlocks {
    /// Description with the blocks removed and cleaned
    pub description: String,
    /// List items without a `key: value` shape
    pub short_description: Vec<String>,
    /// `key: value` list items; `None` when no block had any
    pub attributes: Option<IndexMap<String, String>>,
}

/// Finds "Features"/"Specifications"/"Details"/... header + list blocks
pub fn description_blocks(description: &str) -> DescriptionBlocks {
    let mut description = cut_tag_attributes(description);
    let mut short_description = Vec::new();
    let mut attributes = IndexMap::new();

    for regex in DESCRIPTION_BLOCKS.iter() {
        if !regex.is_match(&description) {
            continue;
        }
        for captures in regex.captures_iter(&description) {
            let Some(list) = captures.name("content_list") else {
                continue;
            };
            for item in LIST_ITEM.captures_iter(list.as_str()) {
                let text = remove_spaces(&decode_entities(&strip_tags(&item[1])));
                match text.split_once(':') {
                    Some((key, value)) => {
                        attributes.insert(
                            key.trim().to_string(),
                            normalize_space(value).trim().to_string(),
                        );
                    }
                    None => short_description.push(text),
                }
            }
        }
        description = regex.replace_all(&description, "").into_owned();
    }

    let short_description = clean_short_description(&short_description);
    let attributes: IndexMap<String, String> = attributes
        .into_iter()
        .filter_map(|(key, value)| {
            let key = cleaning(&key, &[], false);
            let value = remove_spaces(&cleaning(&value, &[], false));
            (!key.is_empty() && is_not_empty(&value)).then_some((key, value))
        })
        .collect();

    DescriptionBlocks {
        description: clean_description(&description),
        short_description,
        attributes: if attributes.is_empty() {
            None
        } else {
            Some(attributes)
        },
    }
}

//! # Input Guard
//!
//! Normalization applied to untrusted strings before any handler sees them:
//!
//! - [`InputGuard::strip_markup`]: drop all markup, keep text content
//! - [`InputGuard::strip_markup_rich`]: keep `b i u em strong br p` (no attributes)
//! - [`InputGuard::sanitize_numeric`]: strict decimal grammar
//! - [`InputGuard::validate_url`]: `https` / `ipfs` only, with SSRF screening
//!
//! Contents of script-like elements (`script`, `style`, `iframe`, ...) and
//! HTML comments are removed entirely. A `<` or `>` that does not form a tag
//! is escaped.

use super::network::is_blocked_ip;
use crate::ports::HostResolver;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};
use url::{Host, Url};

/// Tags kept by the rich-text variant.
pub const RICH_TEXT_TAGS: &[&str] = &["b", "i", "u", "em", "strong", "br", "p"];

/// Elements whose content is discarded along with the tags.
const DROP_CONTENT_TAGS: &[&str] = &[
    "script", "style", "iframe", "noscript", "noembed", "noframes", "template", "title", "xmp",
    "svg", "math", "audio", "video", "object", "head", "textarea", "plaintext",
];

static IPFS_URL: LazyLock<Regex> = LazyLock::new(|| {
    // CIDv0 (base58 "Qm...") or CIDv1 (base32 "b...")
    Regex::new(r"^ipfs://(Qm[1-9A-HJ-NP-Za-km-z]{44}|b[a-z2-7]{20,})(/[^\s]*)?$")
        .expect("static ipfs pattern")
});

/// Indexed by `(allow_negative as usize) << 1 | allow_decimal as usize`.
static NUMERIC_GRAMMARS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"^[0-9]+$",
        r"^[0-9]+(\.[0-9]+)?$",
        r"^-?[0-9]+$",
        r"^-?[0-9]+(\.[0-9]+)?$",
    ]
    .map(|p| Regex::new(p).expect("static numeric pattern"))
});

/// Flags for [`InputGuard::sanitize_numeric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericOptions {
    pub allow_negative: bool,
    pub allow_decimal: bool,
}

impl Default for NumericOptions {
    fn default() -> Self {
        Self {
            allow_negative: false,
            allow_decimal: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldMode {
    Plain,
    Rich,
    Verbatim,
}

/// Sanitizer configured with rich-text and verbatim field names.
#[derive(Clone)]
pub struct InputGuard {
    rich_text_fields: HashSet<String>,
    verbatim_fields: HashSet<String>,
    resolver: Arc<dyn HostResolver>,
}

impl fmt::Debug for InputGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputGuard")
            .field("rich_text_fields", &self.rich_text_fields)
            .field("verbatim_fields", &self.verbatim_fields)
            .finish_non_exhaustive()
    }
}

impl InputGuard {
    pub fn new(
        rich_text_fields: impl IntoIterator<Item = String>,
        verbatim_fields: impl IntoIterator<Item = String>,
        resolver: Arc<dyn HostResolver>,
    ) -> Self {
        Self {
            rich_text_fields: rich_text_fields.into_iter().collect(),
            verbatim_fields: verbatim_fields.into_iter().collect(),
            resolver,
        }
    }

    /// Remove all markup, keeping text content.
    pub fn strip_markup(input: &str) -> String {
        scrub(input, &[])
    }

    /// Remove markup except the [`RICH_TEXT_TAGS`], which lose their attributes.
    pub fn strip_markup_rich(input: &str) -> String {
        scrub(input, RICH_TEXT_TAGS)
    }

    /// Return the trimmed input iff it is a plain decimal number allowed by `options`.
    pub fn sanitize_numeric(input: &str, options: NumericOptions) -> Option<String> {
        let trimmed = input.trim();
        let idx = (usize::from(options.allow_negative) << 1) | usize::from(options.allow_decimal);
        NUMERIC_GRAMMARS[idx]
            .is_match(trimmed)
            .then(|| trimmed.to_string())
    }

    /// Return the trimmed URL iff it is safe to store and later fetch.
    ///
    /// `ipfs://` URLs must carry a CID-shaped path. `https://` URLs must parse,
    /// carry no credentials, and neither name nor resolve to a loopback,
    /// private, link-local or unspecified address. Resolution failure rejects.
    pub async fn validate_url(&self, input: &str) -> Option<String> {
        let trimmed = input.trim();

        if trimmed.starts_with("ipfs://") {
            return IPFS_URL.is_match(trimmed).then(|| trimmed.to_string());
        }

        let url = Url::parse(trimmed).ok()?;
        if url.scheme() != "https" {
            debug!(scheme = url.scheme(), "URL rejected: scheme not allowed");
            return None;
        }
        if !url.username().is_empty() || url.password().is_some() {
            debug!("URL rejected: credentials in authority");
            return None;
        }

        match url.host()? {
            Host::Ipv4(ip) => (!is_blocked_ip(&IpAddr::V4(ip))).then(|| trimmed.to_string()),
            Host::Ipv6(ip) => (!is_blocked_ip(&IpAddr::V6(ip))).then(|| trimmed.to_string()),
            Host::Domain(domain) => {
                let domain = domain.to_ascii_lowercase();
                if domain == "localhost" || domain.ends_with(".localhost") {
                    return None;
                }
                let addrs = match self.resolver.resolve(&domain).await {
                    Ok(addrs) if !addrs.is_empty() => addrs,
                    Ok(_) => return None,
                    Err(e) => {
                        debug!(error = %e, "URL rejected: host did not resolve");
                        return None;
                    }
                };
                if let Some(ip) = addrs.iter().find(|ip| is_blocked_ip(ip)) {
                    warn!(host = %domain, resolved = %ip, "URL rejected: resolves to internal address");
                    return None;
                }
                Some(trimmed.to_string())
            }
        }
    }

    /// Strip markup from every string in `value`, honouring field modes.
    pub fn sanitize_json(&self, value: &mut Value) {
        self.sanitize_value(value, FieldMode::Plain);
    }

    /// Strip markup from a single query-string value.
    pub fn sanitize_query_value(&self, name: &str, value: &str) -> String {
        match self.mode_for(name, FieldMode::Plain) {
            FieldMode::Plain => Self::strip_markup(value),
            FieldMode::Rich => Self::strip_markup_rich(value),
            FieldMode::Verbatim => value.to_string(),
        }
    }

    fn mode_for(&self, key: &str, inherited: FieldMode) -> FieldMode {
        if self.verbatim_fields.contains(key) {
            FieldMode::Verbatim
        } else if self.rich_text_fields.contains(key) {
            FieldMode::Rich
        } else {
            inherited
        }
    }

    fn sanitize_value(&self, value: &mut Value, mode: FieldMode) {
        match value {
            Value::String(s) => match mode {
                FieldMode::Plain => *s = Self::strip_markup(s),
                FieldMode::Rich => *s = Self::strip_markup_rich(s),
                FieldMode::Verbatim => {}
            },
            Value::Array(items) => {
                for item in items {
                    self.sanitize_value(item, mode);
                }
            }
            Value::Object(map) => {
                if mode == FieldMode::Verbatim {
                    return;
                }
                for (key, child) in map.iter_mut() {
                    let child_mode = self.mode_for(key, FieldMode::Plain);
                    self.sanitize_value(child, child_mode);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
}

/// Single-pass markup scrubber. `allowed` tags are re-emitted bare.
fn scrub(input: &str, allowed: &[&str]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(['<', '>']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with('>') {
            out.push_str("&gt;");
            rest = &tail[1..];
            continue;
        }

        if let Some(after) = tail.strip_prefix("<!--") {
            rest = after.find("-->").map_or("", |end| &after[end + 3..]);
            continue;
        }

        match parse_tag(tail) {
            Some(tag) => {
                rest = &tail[tag.len..];
                if tag.closing {
                    if allowed.contains(&tag.name.as_str()) && tag.name != "br" {
                        out.push_str("</");
                        out.push_str(&tag.name);
                        out.push('>');
                    }
                } else if DROP_CONTENT_TAGS.contains(&tag.name.as_str()) {
                    rest = skip_element_content(rest, &tag.name);
                } else if allowed.contains(&tag.name.as_str()) {
                    out.push('<');
                    out.push_str(&tag.name);
                    out.push('>');
                }
            }
            None if starts_tag_like(tail) => {
                // Unterminated tag at end of input
                rest = "";
            }
            None => {
                out.push_str("&lt;");
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

struct Tag {
    name: String,
    closing: bool,
    /// Bytes consumed including the closing `>`.
    len: usize,
}

/// `<` followed by a letter, `/`, `!` or `?`.
fn starts_tag_like(s: &str) -> bool {
    s.as_bytes()
        .get(1)
        .is_some_and(|b| b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
}

/// Parse a tag at the start of `s`, honouring quoted attribute values.
fn parse_tag(s: &str) -> Option<Tag> {
    if !starts_tag_like(s) {
        return None;
    }
    let bytes = s.as_bytes();
    let mut i = 1;
    let closing = bytes[i] == b'/';
    if closing {
        i += 1;
    }
    let name_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    let name = s[name_start..i].to_ascii_lowercase();

    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => {
                return Some(Tag {
                    name,
                    closing,
                    len: i + 1,
                });
            }
            None => {}
        }
        i += 1;
    }
    None
}

/// Skip to just past `</name ...>` (case-insensitive), or to end of input.
fn skip_element_content<'a>(s: &'a str, name: &str) -> &'a str {
    let lower = s.to_ascii_lowercase();
    let needle = format!("</{name}");
    let mut from = 0;
    while let Some(found) = lower[from..].find(&needle) {
        let start = from + found;
        let after_name = start + needle.len();
        let boundary_ok = lower
            .as_bytes()
            .get(after_name)
            .map_or(true, |b| !b.is_ascii_alphanumeric());
        if boundary_ok {
            return match lower[after_name..].find('>') {
                Some(end) => &s[after_name + end + 1..],
                None => "",
            };
        }
        from = after_name;
    }
    ""
}

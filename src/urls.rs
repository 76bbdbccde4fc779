//! Callback url handling.
//!
//! Add-ons navigate by emitting self-referential `plugin://` urls:
//! `plugin://<addon-id>/<route>?<query>`. The host part names the target
//! add-on; the path and query are add-on defined. Two reserved query
//! encodings, `_json_=<hex>` and `_pickle_=<hex>`, carry complex values
//! that are decoded for display but passed through opaque to the add-on.

use regex::{Captures, Regex};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Scheme used by add-on callback urls.
pub const PLUGIN_SCHEME: &str = "plugin";

/// Handle value passed as the second invocation argument. Real hosts
/// hand out listing handles; standalone runs always use -1.
pub const LEGACY_HANDLE: i32 = -1;

/// Parses and validates a callback url.
pub fn parse(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))?;
    if url.scheme() != PLUGIN_SCHEME || url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// The add-on id addressed by a callback url.
pub fn addon_id(url: &Url) -> &str {
    url.host_str().unwrap_or("")
}

/// Builds the root url for an add-on, optionally carrying a content
/// type hint.
pub fn root_url(addon_id: &str, content_type: Option<&str>) -> Result<Url> {
    let raw = match content_type {
        Some(ct) => format!("plugin://{}/?content_type={}", addon_id, ct),
        None => format!("plugin://{}/", addon_id),
    };
    parse(&raw)
}

/// Translates a callback url into the argv triple the add-on expects:
/// the base url without query, the constant legacy handle and the query
/// string with a leading `?`.
#[must_use]
pub fn invocation_args(url: &Url) -> (String, String, String) {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    let query = format!("?{}", url.query().unwrap_or(""));
    (base.to_string(), LEGACY_HANDLE.to_string(), query)
}

/// Rewrites `_json_=<hex>` query payloads into their decoded literal for
/// display. `_pickle_=` payloads cannot be materialized outside the
/// add-on's own runtime and are left untouched, as is anything that
/// fails to decode.
#[must_use]
pub fn decode_for_display(path: &str) -> String {
    let pattern = Regex::new(r"(?i)(_pickle_|_json_)=([0-9a-f]+)")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"));

    pattern
        .replace_all(path, |caps: &Captures<'_>| {
            let key = caps[1].to_lowercase();
            if key != "_json_" {
                return caps[0].to_string();
            }
            match decode_json_payload(&caps[2]) {
                Some(value) => format!("{}={}", &caps[1], value),
                None => {
                    debug!("undecodable _json_ payload: {}", &caps[2]);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

fn decode_json_payload(hex_data: &str) -> Option<String> {
    let bytes = hex::decode(hex_data).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    Some(value.to_string())
}

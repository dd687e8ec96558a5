//! Bridge paths and page locations.

use url::Url;

use crate::error::{BridgeError, Result};

const ORIGIN_BASE: &str = "bridge://app";
const LOCATION_BASE: &str = "app:///";

/// Parses `/<segment>[/<segment>...][?query]` into an origin URL.
pub fn parse_origin(path: &str) -> Result<Url> {
    if !path.starts_with('/') {
        return Err(invalid_path(path, "must start with '/'"));
    }

    let route = path.split(['?', '#']).next().unwrap_or_default();
    if route.len() < 2 || route.split('/').skip(1).any(str::is_empty) {
        return Err(invalid_path(path, "empty segment"));
    }

    let origin = format!("{ORIGIN_BASE}{path}");
    Url::parse(&origin).map_err(|source| BridgeError::InvalidUrl {
        url: path.to_string(),
        source,
    })
}

/// Registry key for a path: everything before the query.
pub fn route_key(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or_default()
}

/// Route part of an origin URL, matching [`route_key`].
pub fn origin_route(origin: &Url) -> &str {
    origin.path()
}

/// First value of a query parameter.
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

/// Parses a page location. Relative locations resolve against `app:///`.
pub fn parse_location(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(LOCATION_BASE)
            .and_then(|base| base.join(raw))
            .map_err(|source| BridgeError::InvalidUrl {
                url: raw.to_string(),
                source,
            }),
        Err(source) => Err(BridgeError::InvalidUrl {
            url: raw.to_string(),
            source,
        }),
    }
}

/// Component name a location points at: the host when present, else the path
/// without slashes, lowercased.
pub fn component_name(url: &Url) -> String {
    let name = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => url.path().trim_matches('/').replace('/', "."),
    };
    name.to_lowercase()
}

fn invalid_path(path: &str, reason: &str) -> BridgeError {
    BridgeError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

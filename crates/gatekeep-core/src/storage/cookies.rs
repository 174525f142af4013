use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use tracing::debug;

/// Cookies the Auth service sets for its HttpOnly session; cleared on logout.
pub const AUTH_COOKIE_NAMES: [&str; 3] = ["access_token", "refresh_token", "apikey_tkn"];

/// Clears server-set session cookies.
pub trait CookieManager: Send + Sync {
    fn clear_auth_cookies(&self);
}

/// Cookie jar shared with the auth HTTP client.
///
/// The jar is dedicated to the single Auth service origin, so cookies are
/// keyed by name only; domain and path attributes are not tracked. Cookie
/// values are opaque and never inspected.
#[derive(Debug, Default)]
pub struct AuthCookieJar {
    cookies: RwLock<BTreeMap<String, String>>,
}

impl AuthCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse a cookie `Expires` date, RFC 1123 or the older dashed form
fn parse_expires(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Whether a cookie attribute tells the client to drop the cookie now
fn expires_now(attr: &str, now: DateTime<Utc>) -> bool {
    let Some((name, value)) = attr.split_once('=') else {
        return false;
    };
    match name.trim().to_ascii_lowercase().as_str() {
        "max-age" => value.trim().parse::<i64>().is_ok_and(|secs| secs <= 0),
        "expires" => parse_expires(value).is_some_and(|at| at <= now),
        _ => false,
    }
}

/// Split a `Set-Cookie` header into its name and value, and whether the
/// server asked for the cookie to be dropped.
fn parse_set_cookie(raw: &str, now: DateTime<Utc>) -> Option<(&str, &str, bool)> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim();
    let expired = value.is_empty() || parts.any(|attr| expires_now(attr, now));
    Some((name, value, expired))
}

impl CookieStore for AuthCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, _url: &Url) {
        let now = Utc::now();
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            match parse_set_cookie(raw, now) {
                Some((name, _, true)) => {
                    cookies.remove(name);
                }
                Some((name, value, false)) => {
                    cookies.insert(name.to_string(), value.to_string());
                }
                None => debug!("Ignoring malformed Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, _url: &Url) -> Option<HeaderValue> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        if cookies.is_empty() {
            return None;
        }
        let header = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}

impl CookieManager for AuthCookieJar {
    fn clear_auth_cookies(&self) {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        let before = cookies.len();
        cookies.retain(|name, _| !AUTH_COOKIE_NAMES.contains(&name.as_str()));
        debug!(cleared = before - cookies.len(), "Cleared auth cookies");
    }
}

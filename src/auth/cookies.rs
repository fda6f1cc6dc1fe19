use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderName,
};
use axum::response::AppendHeaders;
use cookie::{Cookie, SameSite};
use time::Duration as CookieDuration;

use crate::auth::tokens::{TokenIssuer, TokenPair};
use crate::config::CookieConfig;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

pub type SetCookies = AppendHeaders<[(HeaderName, String); 2]>;

fn token_cookie(name: &'static str, value: String, cfg: &CookieConfig) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(cfg.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// `Set-Cookie` headers carrying both tokens. Max-Age follows each token's lifetime.
pub fn token_cookies(pair: &TokenPair, tokens: &TokenIssuer, cfg: &CookieConfig) -> SetCookies {
    let mut access = token_cookie(ACCESS_COOKIE, pair.access_token.clone(), cfg);
    access.set_max_age(CookieDuration::seconds(tokens.access_ttl().as_secs() as i64));
    let mut refresh = token_cookie(REFRESH_COOKIE, pair.refresh_token.clone(), cfg);
    refresh.set_max_age(CookieDuration::seconds(tokens.refresh_ttl().as_secs() as i64));
    AppendHeaders([
        (SET_COOKIE, access.to_string()),
        (SET_COOKIE, refresh.to_string()),
    ])
}

/// `Set-Cookie` headers that make the browser drop both tokens.
pub fn cleared_cookies(cfg: &CookieConfig) -> SetCookies {
    let mut access = token_cookie(ACCESS_COOKIE, String::new(), cfg);
    access.make_removal();
    let mut refresh = token_cookie(REFRESH_COOKIE, String::new(), cfg);
    refresh.make_removal();
    AppendHeaders([
        (SET_COOKIE, access.to_string()),
        (SET_COOKIE, refresh.to_string()),
    ])
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| Cookie::split_parse(s))
        .filter_map(Result::ok)
        .find(|c| c.name() == name && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

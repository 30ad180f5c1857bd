//! RFC 6265 cookie jar.
//!
//! The teacher (`ureq`) delegates this entirely to the external `cookie_store`
//! crate behind its `cookies` feature (`src/cookies.rs` there is a thin
//! `RwLock<CookieStore>` wrapper). The spec requires the matching and
//! `Set-Cookie` parsing semantics to be implemented directly (spec §4.2), so
//! this module hand-rolls RFC 6265 §5.1–§5.3 in the teacher's structural
//! style: a small owned collection behind straightforward methods, no
//! builder ceremony.

use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// `SameSite=None`.
    None,
    /// `SameSite=Lax`.
    Lax,
    /// `SameSite=Strict`.
    Strict,
}

/// A single cookie, as stored in the jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie applies to. Host-only cookies store the exact host
    /// here; domain cookies store it without a leading dot (the dot is
    /// implied by [`Cookie::host_only`] being `false`).
    pub domain: String,
    /// Whether this is a host-only cookie (no `Domain` attribute given).
    pub host_only: bool,
    /// Path the cookie applies to.
    pub path: String,
    /// Expiry time as seconds since the Unix epoch. `None` means a session
    /// cookie with no `Expires`/`Max-Age`.
    pub expires: Option<u64>,
    /// `Secure` attribute.
    pub secure: bool,
    /// `HttpOnly` attribute.
    pub http_only: bool,
    /// `SameSite` attribute.
    pub same_site: SameSite,
    /// Monotonically increasing insertion sequence, used to break ties when
    /// serializing cookies with equal path length.
    seq: u64,
}

impl Cookie {
    /// Whether the cookie has expired as of `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires, Some(exp) if now > exp)
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// An RFC 6265 cookie jar, unique on `(name, domain, path)`.
#[derive(Debug, Clone, Default)]
pub struct Jar {
    cookies: Vec<Cookie>,
    next_seq: u64,
}

impl Jar {
    /// A new, empty jar.
    pub fn new() -> Self {
        Jar::default()
    }

    /// Number of cookies currently stored (including expired ones that have
    /// not yet been swept by [`Jar::remove_expired`]).
    pub fn size(&self) -> usize {
        self.cookies.len()
    }

    /// Insert (or replace) a cookie. Uniqueness is on `(name, domain, path)`;
    /// a matching existing entry is replaced in place, preserving nothing of
    /// the old entry but its slot is reused only conceptually — the insertion
    /// sequence for ordering purposes restarts for the new value, matching
    /// browser "most recently set wins the tie-break" behavior.
    pub fn set(&mut self, mut cookie: Cookie) {
        let key_matches = |c: &Cookie| {
            c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path
        };
        if let Some(pos) = self.cookies.iter().position(key_matches) {
            self.cookies.remove(pos);
        }
        cookie.seq = self.next_seq;
        self.next_seq += 1;
        self.cookies.push(cookie);
    }

    /// Parse one `Set-Cookie` header value against `request_url` and store
    /// the result, per RFC 6265 §5.2. Malformed or domain-mismatched cookies
    /// are silently dropped, as a browser would.
    pub fn set_from_header(&mut self, header: &str, request_url: &Url) {
        if let Some(cookie) = parse_set_cookie(header, request_url) {
            self.set(cookie);
        }
    }

    /// Cookies applicable to `url`, ordered by path length descending, ties
    /// broken by insertion order (spec §4.2).
    pub fn get_for(&self, url: &Url) -> Vec<&Cookie> {
        let now = now_unix();
        let host = url.host_str().unwrap_or("");
        let path = url.path();
        let is_https = url.scheme() == "https";

        let mut matches: Vec<&Cookie> = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired_at(now))
            .filter(|c| domain_matches(c, host))
            .filter(|c| path_matches(&c.path, path))
            .filter(|c| !c.secure || is_https)
            .collect();

        matches.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.seq.cmp(&b.seq)));
        matches
    }

    /// Render the `Cookie` request header value for `url`. Empty when no
    /// cookie matches (the caller then omits the header entirely).
    pub fn serialize_header(&self, url: &Url) -> String {
        self.get_for(url)
            .into_iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Remove a specific cookie by its key. `path = None` removes all paths
    /// under `(name, domain)`.
    pub fn remove(&mut self, name: &str, domain: &str, path: Option<&str>) {
        self.cookies.retain(|c| {
            !(c.name == name
                && c.domain == domain
                && path.map(|p| p == c.path).unwrap_or(true))
        });
    }

    /// Drop every cookie whose `expires` is in the past.
    pub fn remove_expired(&mut self) {
        let now = now_unix();
        self.cookies.retain(|c| !c.is_expired_at(now));
    }

    /// Remove every cookie from the jar.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Iterate all stored cookies (including expired ones).
    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }
}

/// RFC 6265 §5.1.3 domain-match: exact equality, or the cookie's domain
/// (without its leading dot) is a suffix of `host` preceded by a dot.
fn domain_matches(cookie: &Cookie, host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = cookie.domain.to_ascii_lowercase();
    if cookie.host_only {
        return host == domain;
    }
    host == domain || (host.ends_with(&domain) && host[..host.len() - domain.len()].ends_with('.'))
}

/// RFC 6265 §5.1.4 path-match.
fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == request_path {
        return true;
    }
    if request_path.starts_with(cookie_path) {
        if cookie_path.ends_with('/') {
            return true;
        }
        if request_path.as_bytes().get(cookie_path.len()) == Some(&b'/') {
            return true;
        }
    }
    false
}

/// RFC 6265 §5.1.4 default-path: up to but not including the last `/`, or
/// `/` if the URL path has none.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn parse_set_cookie(header: &str, request_url: &Url) -> Option<Cookie> {
    let mut parts = header.splitn(2, ';');
    let name_value = parts.next()?.trim();
    let (name, value) = name_value.split_once('=')?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        return None;
    }

    let mut domain: Option<String> = None;
    let mut path: Option<String> = None;
    let mut expires: Option<u64> = None;
    let mut max_age: Option<i64> = None;
    let mut secure = false;
    let mut http_only = false;
    let mut same_site = SameSite::Lax;

    for attr in parts.next().unwrap_or("").split(';') {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let (attr_name, attr_value) = match attr.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim()),
            None => (attr, ""),
        };
        match attr_name.to_ascii_lowercase().as_str() {
            "domain" => {
                let d = attr_value.trim_start_matches('.');
                if !d.is_empty() {
                    domain = Some(d.to_ascii_lowercase());
                }
            }
            "path" => {
                if attr_value.starts_with('/') {
                    path = Some(attr_value.to_string());
                }
            }
            "expires" => {
                if let Some(secs) = parse_http_date(attr_value) {
                    expires = Some(secs);
                }
            }
            "max-age" => {
                if let Ok(n) = attr_value.parse::<i64>() {
                    max_age = Some(n);
                }
            }
            "secure" => secure = true,
            "httponly" => http_only = true,
            "samesite" => {
                same_site = match attr_value.to_ascii_lowercase().as_str() {
                    "strict" => SameSite::Strict,
                    "none" => SameSite::None,
                    _ => SameSite::Lax,
                };
            }
            _ => {}
        }
    }

    // Max-Age takes precedence over Expires (spec §4.2).
    if let Some(max_age) = max_age {
        expires = Some(if max_age <= 0 {
            0
        } else {
            now_unix().saturating_add(max_age as u64)
        });
    }

    let request_host = request_url.host_str()?.to_ascii_lowercase();
    let (final_domain, host_only) = match domain {
        Some(d) => {
            if d == request_host {
                // Domain explicitly equal to the request host is host-only,
                // same as an absent Domain attribute (spec §4.2).
                (d, true)
            } else if request_host.ends_with(&format!(".{d}")) {
                (d, false)
            } else {
                // Domain is not a suffix of the request host: reject (spec §4.2).
                return None;
            }
        }
        None => (request_host, true),
    };

    let final_path = path.unwrap_or_else(|| default_path(request_url));

    Some(Cookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: final_domain,
        host_only,
        path: final_path,
        expires,
        secure,
        http_only,
        same_site,
        seq: 0,
    })
}

/// Parse IMF-fixdate, RFC 1123, RFC 850, or ANSI C asctime into seconds since
/// the Unix epoch. Returns `None` on anything unrecognized. A hand-rolled
/// parser is used in preference to pulling in a date/time crate, since only
/// these four fixed layouts appear in `Expires` values (RFC 6265 §5.1.1).
fn parse_http_date(s: &str) -> Option<u64> {
    let s = s.trim();

    // "Sun, 06 Nov 1994 08:49:37 GMT" (IMF-fixdate / RFC 1123)
    if let Some(rest) = s.find(", ").map(|i| &s[i + 2..]) {
        if let Some(v) = parse_day_month_year_time(rest, "%d %b %Y %H:%M:%S") {
            return Some(v);
        }
    }
    // "Sunday, 06-Nov-94 08:49:37 GMT" (RFC 850)
    if let Some(rest) = s.find(", ").map(|i| &s[i + 2..]) {
        if let Some(v) = parse_rfc850(rest) {
            return Some(v);
        }
    }
    // "Sun Nov  6 08:49:37 1994" (ANSI C asctime)
    parse_asctime(s)
}

fn month_index(mon: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let mon = mon.to_ascii_lowercase();
    MONTHS.iter().position(|m| *m == mon).map(|i| i as u32 + 1)
}

fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    // Howard Hinnant's civil_from_days algorithm, days-since-epoch direction.
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = ((m as i64 + 9) % 12) as i64;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn ymd_hms_to_unix(year: i64, month: u32, day: u32, h: u32, m: u32, s: u32) -> u64 {
    let days = days_from_civil(year, month, day);
    (days * 86400 + h as i64 * 3600 + m as i64 * 60 + s as i64).max(0) as u64
}

fn parse_day_month_year_time(rest: &str, _fmt: &str) -> Option<u64> {
    // "06 Nov 1994 08:49:37 GMT"
    let mut it = rest.split_whitespace();
    let day: u32 = it.next()?.parse().ok()?;
    let month = month_index(it.next()?)?;
    let year: i64 = it.next()?.parse().ok()?;
    let time = it.next()?;
    let (h, m, s) = parse_hms(time)?;
    Some(ymd_hms_to_unix(year, month, day, h, m, s))
}

fn parse_rfc850(rest: &str) -> Option<u64> {
    // "06-Nov-94 08:49:37 GMT"
    let mut it = rest.split_whitespace();
    let date = it.next()?;
    let time = it.next()?;
    let mut dparts = date.split('-');
    let day: u32 = dparts.next()?.parse().ok()?;
    let month = month_index(dparts.next()?)?;
    let yy: i64 = dparts.next()?.parse().ok()?;
    let year = if yy < 70 { 2000 + yy } else { 1900 + yy };
    let (h, m, s) = parse_hms(time)?;
    Some(ymd_hms_to_unix(year, month, day, h, m, s))
}

fn parse_asctime(s: &str) -> Option<u64> {
    // "Sun Nov  6 08:49:37 1994"
    let mut it = s.split_whitespace();
    let _dow = it.next()?;
    let month = month_index(it.next()?)?;
    let day: u32 = it.next()?.parse().ok()?;
    let time = it.next()?;
    let year: i64 = it.next()?.parse().ok()?;
    let (h, m, s) = parse_hms(time)?;
    Some(ymd_hms_to_unix(year, month, day, h, m, s))
}

fn parse_hms(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.splitn(3, ':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let s: u32 = parts.next()?.parse().ok()?;
    Some((h, m, s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn cookie_round_trip() {
        let mut jar = Jar::new();
        jar.set(Cookie {
            name: "name".into(),
            value: "value".into(),
            domain: "h".into(),
            host_only: true,
            path: "/".into(),
            expires: None,
            secure: false,
            http_only: false,
            same_site: SameSite::Lax,
            seq: 0,
        });
        let u = url("http://h/");
        assert_eq!(jar.serialize_header(&u), "name=value");
    }

    #[test]
    fn domain_suffix_matching() {
        let mut jar = Jar::new();
        jar.set_from_header("sess=1; Domain=example.com; Path=/", &url("http://api.example.com/x"));
        assert_eq!(jar.get_for(&url("http://example.com/")).len(), 1);
        assert_eq!(jar.get_for(&url("http://api.example.com/")).len(), 1);
        assert_eq!(jar.get_for(&url("http://notexample.com/")).len(), 0);
        assert_eq!(jar.get_for(&url("http://example.com.evil.com/")).len(), 0);
    }

    #[test]
    fn domain_equal_to_request_host_is_host_only() {
        let mut jar = Jar::new();
        jar.set_from_header("sess=1; Domain=example.com; Path=/", &url("http://example.com/x"));
        assert_eq!(jar.get_for(&url("http://example.com/")).len(), 1);
        // Explicit Domain equal to the request host is host-only (spec §4.2),
        // so it must not also match a subdomain.
        assert_eq!(jar.get_for(&url("http://api.example.com/")).len(), 0);
    }

    #[test]
    fn set_cookie_header_request() {
        let mut jar = Jar::new();
        jar.set(Cookie {
            name: "s".into(),
            value: "1".into(),
            domain: "h".into(),
            host_only: true,
            path: "/".into(),
            expires: None,
            secure: false,
            http_only: false,
            same_site: SameSite::Lax,
            seq: 0,
        });
        assert_eq!(jar.serialize_header(&url("http://h/a")), "s=1");
    }

    #[test]
    fn max_age_negative_is_immediately_expired() {
        let mut jar = Jar::new();
        jar.set_from_header("s=1; Max-Age=-1", &url("http://h/"));
        assert_eq!(jar.get_for(&url("http://h/")).len(), 0);
    }

    #[test]
    fn secure_cookie_requires_https() {
        let mut jar = Jar::new();
        jar.set_from_header("s=1; Secure", &url("https://h/"));
        assert_eq!(jar.get_for(&url("https://h/")).len(), 1);
        assert_eq!(jar.get_for(&url("http://h/")).len(), 0);
    }

    #[test]
    fn parses_imf_fixdate() {
        let secs = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(secs, 784111777);
    }

    #[test]
    fn parses_rfc850_date() {
        let secs = parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap();
        assert_eq!(secs, 784111777);
    }

    #[test]
    fn parses_asctime_date() {
        let secs = parse_http_date("Sun Nov  6 08:49:37 1994").unwrap();
        assert_eq!(secs, 784111777);
    }

    #[test]
    fn insertion_order_breaks_ties_on_equal_path_length() {
        let mut jar = Jar::new();
        jar.set_from_header("a=1; Path=/p", &url("http://h/p"));
        jar.set_from_header("b=2; Path=/p", &url("http://h/p"));
        let names: Vec<_> = jar.get_for(&url("http://h/p")).iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn longer_path_sorts_first() {
        let mut jar = Jar::new();
        jar.set_from_header("a=1; Path=/", &url("http://h/p/q"));
        jar.set_from_header("b=2; Path=/p", &url("http://h/p/q"));
        let names: Vec<_> = jar.get_for(&url("http://h/p/q")).iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}

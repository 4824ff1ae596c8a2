//! Tiny HTTP/1.1 responder for the time server page.

use core::fmt::{self, Write};

pub const HTTP_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Route {
    Index,
    NotFound,
    MethodNotAllowed,
    BadRequest,
}

impl Route {
    pub fn status(self) -> (u16, &'static str) {
        match self {
            Route::Index => (200, "OK"),
            Route::NotFound => (404, "Not Found"),
            Route::MethodNotAllowed => (405, "Method Not Allowed"),
            Route::BadRequest => (400, "Bad Request"),
        }
    }
}

/// Method and path from the first line of `request`.
pub fn parse_request_line(request: &[u8]) -> Option<(&str, &str)> {
    let end = request.iter().position(|&b| b == b'\n')?;
    let line = core::str::from_utf8(&request[..end]).ok()?.trim_end_matches('\r');
    let mut parts = line.split(' ');
    let method = parts.next().filter(|m| !m.is_empty())?;
    let target = parts.next().filter(|t| t.starts_with('/'))?;
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    Some((method, target))
}

pub fn route(request: &[u8]) -> Route {
    let Some((method, target)) = parse_request_line(request) else {
        return Route::BadRequest;
    };
    let path = target.split('?').next().unwrap_or(target);
    match (method, path) {
        ("GET", "/") => Route::Index,
        (_, "/") => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

/// Landing page body.
pub struct IndexPage<T> {
    pub time: T,
    pub wifi_connected: bool,
}

impl<T: fmt::Display> fmt::Display for IndexPage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wifi = if self.wifi_connected {
            "Connected"
        } else {
            "Disconnected"
        };
        write!(
            f,
            "<!DOCTYPE html>\
             <html>\
             <head><title>ESP32 Time Server</title></head>\
             <body>\
             <h1>Welcome to ESP32!</h1>\
             <p>Current Time: <strong>{}</strong></p>\
             <p>Wi-Fi Status: <strong>{}</strong></p>\
             <p>Device is up and running!</p>\
             </body>\
             </html>",
            self.time, wifi
        )
    }
}

/// Counts bytes written through `fmt::Write`.
struct Counter(usize);

impl Write for Counter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Writes a complete response with `Content-Length` and
/// `Connection: close`. Error routes get a plain-text body.
pub fn write_response<W, B>(out: &mut W, route: Route, body: &B) -> fmt::Result
where
    W: Write,
    B: fmt::Display,
{
    let (code, reason) = route.status();
    if route == Route::Index {
        let mut counter = Counter(0);
        write!(counter, "{body}")?;
        write!(
            out,
            "HTTP/1.1 {code} {reason}\r\n\
             Content-Type: text/html\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            counter.0
        )
    } else {
        write!(
            out,
            "HTTP/1.1 {code} {reason}\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{reason}",
            reason.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::{String, ToString};

    #[test]
    fn parses_request_line() {
        let req = b"GET /index.html?x=1 HTTP/1.1\r\nHost: esp32\r\n\r\n";
        assert_eq!(parse_request_line(req), Some(("GET", "/index.html?x=1")));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_request_line(b"GET / HTTP/1.1"), None);
        assert_eq!(parse_request_line(b"\r\n"), None);
        assert_eq!(parse_request_line(b"GET nope HTTP/1.1\r\n"), None);
        assert_eq!(parse_request_line(b"GET / FTP\r\n"), None);
        assert_eq!(parse_request_line(b"\xFF\xFE / HTTP/1.1\r\n"), None);
    }

    #[test]
    fn routes_root_only() {
        assert_eq!(route(b"GET / HTTP/1.1\r\n\r\n"), Route::Index);
        assert_eq!(route(b"GET /?refresh=1 HTTP/1.0\r\n"), Route::Index);
        assert_eq!(route(b"GET /favicon.ico HTTP/1.1\r\n"), Route::NotFound);
        assert_eq!(route(b"POST / HTTP/1.1\r\n"), Route::MethodNotAllowed);
        assert_eq!(route(b"hello\n"), Route::BadRequest);
    }

    #[test]
    fn page_shows_time_and_status() {
        let page = IndexPage {
            time: "Monday, January 01, 2024 13:05:09",
            wifi_connected: true,
        }
        .to_string();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>ESP32 Time Server</title>"));
        assert!(page.contains(
            "<p>Current Time: <strong>Monday, January 01, 2024 13:05:09</strong></p>"
        ));
        assert!(page.contains("<p>Wi-Fi Status: <strong>Connected</strong></p>"));
        assert!(page.contains("Device is up and running!"));
    }

    #[test]
    fn index_response_has_exact_length() {
        let page = IndexPage {
            time: "now",
            wifi_connected: false,
        };
        let body = page.to_string();
        let mut out = String::new();
        write_response(&mut out, Route::Index, &page).unwrap();

        let (head, rest) = out.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
        assert_eq!(rest, body);
    }

    #[test]
    fn not_found_response() {
        let mut out = String::new();
        write_response(&mut out, Route::NotFound, &"").unwrap();
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.contains("Content-Length: 9\r\n"));
        assert!(out.ends_with("\r\n\r\nNot Found"));
    }
}

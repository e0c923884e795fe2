//! Camouflage error responses.
//!
//! Every rejection looks exactly like a stock nginx error page: same body,
//! same `Server` header, same status line. Any deviation between rejection
//! paths would let a prober tell this service apart from a plain web server,
//! so the bodies are fixed constants and the header set never varies.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};

/// Value of the `Server` header on every camouflage response.
pub const SERVER_NAME: &str = "nginx";

pub const FORBIDDEN_BODY: &[u8] = b"<html>
<head><title>403 Forbidden</title></head>
<body>
<center><h1>403 Forbidden</h1></center>
<hr><center>nginx</center>
</body>
</html>";

pub const NOT_FOUND_BODY: &[u8] = b"<html>
<head><title>404 Not Found</title></head>
<body>
<center><h1>404 Not Found</h1></center>
<hr><center>nginx</center>
</body>
</html>";

pub const HEADER_TOO_LARGE_BODY: &[u8] = b"<html>
<head><title>400 Request Header Or Cookie Too Large</title></head>
<body>
<center><h1>400 Bad Request</h1></center>
<center>Request Header Or Cookie Too Large</center>
<hr><center>nginx</center>
</body>
</html>";

/// 403 for requests on the upgrade path that fail the handshake.
pub fn forbidden() -> Response {
    camouflage(StatusCode::FORBIDDEN, FORBIDDEN_BODY)
}

/// 404 for every path other than the upgrade path.
pub fn not_found() -> Response {
    camouflage(StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

/// 400 for requests whose header block exceeds the size limit.
pub fn header_too_large() -> Response {
    camouflage(StatusCode::BAD_REQUEST, HEADER_TOO_LARGE_BODY)
}

fn camouflage(status: StatusCode, body: &'static [u8]) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn forbidden_is_nginx_403() {
        let response = forbidden();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::SERVER], "nginx");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body_bytes(response).await, FORBIDDEN_BODY);
    }

    #[tokio::test]
    async fn not_found_is_nginx_404() {
        let response = not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::SERVER], "nginx");
        assert_eq!(body_bytes(response).await, NOT_FOUND_BODY);
    }

    #[test]
    fn rejections_share_one_header_set() {
        let names = |r: Response| {
            let mut names: Vec<String> = r.headers().keys().map(|k| k.to_string()).collect();
            names.sort();
            names
        };
        assert_eq!(names(forbidden()), names(not_found()));
        assert_eq!(names(forbidden()), names(header_too_large()));
    }

    #[test]
    fn bodies_have_no_trailing_newline() {
        assert!(FORBIDDEN_BODY.ends_with(b"</html>"));
        assert!(NOT_FOUND_BODY.ends_with(b"</html>"));
        assert!(NOT_FOUND_BODY.starts_with(b"<html>\n<head>"));
    }
}

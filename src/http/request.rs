/// HTTP request methods accepted on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data (the body is never read)
    POST,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use badhttpd::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// assert_eq!(Method::from_str("PUT"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLineError {
    MalformedRequestLine,
    MalformedHeaderLine,
}

/// The three parts of `METHOD SP PATH SP HTTP-VERSION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    /// Raw request target, always starting with `/`
    pub path: String,
    /// e.g. "HTTP/1.1"
    pub version: String,
}

/// Parses a request line.
///
/// Exactly one space separates the parts, the path must start with `/`,
/// and the version must look like `HTTP/<digits and dots>`.
pub fn parse_request_line(line: &str) -> Result<RequestLine, RequestLineError> {
    let mut parts = line.split(' ');

    let (Some(method), Some(path), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(RequestLineError::MalformedRequestLine);
    };

    let method = Method::from_str(method).ok_or(RequestLineError::MalformedRequestLine)?;

    if !path.starts_with('/') {
        return Err(RequestLineError::MalformedRequestLine);
    }

    let valid_version = version
        .strip_prefix("HTTP/")
        .is_some_and(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit() || b == b'.'));
    if !valid_version {
        return Err(RequestLineError::MalformedRequestLine);
    }

    Ok(RequestLine {
        method,
        path: path.to_string(),
        version: version.to_string(),
    })
}

/// Parses a `Name: value` header line.
///
/// The name is ASCII alphanumerics and `-`; the value must be non-empty.
pub fn parse_header_line(line: &str) -> Result<(String, String), RequestLineError> {
    let (name, value) = line
        .split_once(": ")
        .ok_or(RequestLineError::MalformedHeaderLine)?;

    let valid_name =
        !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if !valid_name || value.is_empty() {
        return Err(RequestLineError::MalformedHeaderLine);
    }

    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let line = parse_request_line("GET /redir:1 HTTP/1.1").unwrap();

        assert_eq!(line.method, Method::GET);
        assert_eq!(line.path, "/redir:1");
        assert_eq!(line.version, "HTTP/1.1");
    }
}

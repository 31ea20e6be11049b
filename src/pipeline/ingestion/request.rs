use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// The request headers the pipeline reads. Everything else is left to the
/// HTTP layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestHeaders {
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Client address as resolved by the HTTP layer (forwarded header or peer).
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
}

/// One inbound tracking request, exactly as read off the wire.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: HttpMethod,
    /// Query string without the leading `?`.
    pub query: String,
    pub body: Vec<u8>,
    pub headers: RequestHeaders,
}

impl RawRequest {
    pub fn get(query: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            query: query.into(),
            body: Vec::new(),
            headers: RequestHeaders::default(),
        }
    }

    pub fn post(body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: HttpMethod::Post,
            query: String::new(),
            body: body.into(),
            headers: RequestHeaders {
                content_type: Some("application/json".to_string()),
                ..RequestHeaders::default()
            },
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.headers.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.headers.client_ip = Some(ip.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.headers.cookie = Some(cookie.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.headers.content_type = Some(content_type.into());
        self
    }

    /// True when the body is a form-encoded field list rather than JSON.
    pub fn is_form_encoded(&self) -> bool {
        self.headers
            .content_type
            .as_deref()
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }
}

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Method;
use std::fmt;

use crate::errors::AppResult;
use crate::security::InputValidator;

use super::uploadable::{ResourceRef, Uploadable};

/// Characters escaped when an item name becomes one URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where uploads go. Validated on construction so that building requests
/// cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    base_url: String,
    credentials: Option<Credentials>,
}

impl UploadTarget {
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> AppResult<Self> {
        InputValidator::validate_domain(base_url)?;

        if let Some(credentials) = &credentials {
            InputValidator::validate_username(&credentials.username)?;
            InputValidator::validate_password(&credentials.password)?;
        }

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

/// Description of the single multipart part a request carries. Turned into a
/// real form only when the request is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartBody {
    Text {
        field_name: String,
        value: String,
    },
    File {
        field_name: String,
        file_name: String,
        source: ResourceRef,
        mime_type: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct UploadRequestSpec {
    pub name: String,
    pub url: String,
    pub method: Method,
    pub body: MultipartBody,
    pub auth_header: Option<String>,
}

impl fmt::Debug for UploadRequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequestSpec")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("body", &self.body)
            .field("auth_header", &self.auth_header.as_ref().map(|_| "Basic ***"))
            .finish()
    }
}

pub fn basic_auth_header(credentials: &Credentials) -> String {
    let token = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
    format!("Basic {}", token)
}

/// Build the request description for one uploadable. Pure; performs no I/O.
pub fn build_request(item: Uploadable, target: &UploadTarget) -> UploadRequestSpec {
    let name = item.name();
    let url = format!(
        "{}/{}",
        target.base_url(),
        utf8_percent_encode(&name, PATH_SEGMENT)
    );

    let body = match item {
        Uploadable::Text(text) => MultipartBody::Text {
            field_name: name.clone(),
            value: text.content().to_string(),
        },
        Uploadable::File(file) => MultipartBody::File {
            field_name: name.clone(),
            file_name: name.clone(),
            source: file.locator().clone(),
            mime_type: mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        },
    };

    UploadRequestSpec {
        name,
        url,
        method: Method::POST,
        body,
        auth_header: target.credentials().map(basic_auth_header),
    }
}

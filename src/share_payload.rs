//! Normalizes the fields a host share surface hands over into an ordered list
//! of uploadables.

use serde::{Deserialize, Serialize};

use crate::errors::ParseError;
use crate::uploader::uploadable::{ResourceRef, Uploadable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShareAction {
    /// One text or one file reference.
    Send,
    /// A list of texts or a list of file references.
    SendMultiple,
    /// A file reference given directly.
    View,
    Unknown(String),
}

impl From<&str> for ShareAction {
    fn from(action: &str) -> Self {
        let short = action.strip_prefix("android.intent.action.").unwrap_or(action);
        match short {
            "SEND" => ShareAction::Send,
            "SEND_MULTIPLE" => ShareAction::SendMultiple,
            "VIEW" => ShareAction::View,
            _ => ShareAction::Unknown(action.to_string()),
        }
    }
}

impl From<String> for ShareAction {
    fn from(action: String) -> Self {
        ShareAction::from(action.as_str())
    }
}

impl From<ShareAction> for String {
    fn from(action: ShareAction) -> Self {
        match action {
            ShareAction::Send => "SEND".to_string(),
            ShareAction::SendMultiple => "SEND_MULTIPLE".to_string(),
            ShareAction::View => "VIEW".to_string(),
            ShareAction::Unknown(other) => other,
        }
    }
}

/// Already-extracted share fields. Which ones are meaningful depends on `action`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharePayload {
    pub action: Option<ShareAction>,
    pub text: Option<String>,
    pub texts: Option<Vec<String>>,
    pub stream: Option<ResourceRef>,
    pub streams: Option<Vec<ResourceRef>>,
    pub data: Option<ResourceRef>,
}

impl SharePayload {
    pub fn send_text(text: impl Into<String>) -> Self {
        Self {
            action: Some(ShareAction::Send),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn send_file(stream: ResourceRef) -> Self {
        Self {
            action: Some(ShareAction::Send),
            stream: Some(stream),
            ..Default::default()
        }
    }

    pub fn send_multiple_texts(texts: Vec<String>) -> Self {
        Self {
            action: Some(ShareAction::SendMultiple),
            texts: Some(texts),
            ..Default::default()
        }
    }

    pub fn send_multiple_files(streams: Vec<ResourceRef>) -> Self {
        Self {
            action: Some(ShareAction::SendMultiple),
            streams: Some(streams),
            ..Default::default()
        }
    }

    pub fn view(data: ResourceRef) -> Self {
        Self {
            action: Some(ShareAction::View),
            data: Some(data),
            ..Default::default()
        }
    }
}

/// Resolve a payload into a non-empty, ordered list of uploadables.
pub fn parse_share_payload(payload: &SharePayload) -> Result<Vec<Uploadable>, ParseError> {
    let action = payload
        .action
        .as_ref()
        .ok_or_else(|| ParseError::malformed("share action is missing"))?;

    let uploadables = match action {
        ShareAction::Send => {
            if let Some(text) = &payload.text {
                vec![Uploadable::text(text.clone(), 0)]
            } else if let Some(stream) = &payload.stream {
                vec![Uploadable::file(stream.clone())?]
            } else {
                return Err(ParseError::malformed("SEND carries neither text nor a stream"));
            }
        }
        ShareAction::SendMultiple => {
            let texts = payload.texts.as_deref().unwrap_or_default();
            let streams = payload.streams.as_deref().unwrap_or_default();

            if !texts.is_empty() {
                texts
                    .iter()
                    .enumerate()
                    .map(|(ordinal, text)| Uploadable::text(text.clone(), ordinal))
                    .collect()
            } else if !streams.is_empty() {
                streams
                    .iter()
                    .map(|stream| Uploadable::file(stream.clone()))
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                return Err(ParseError::malformed(
                    "SEND_MULTIPLE carries neither texts nor streams",
                ));
            }
        }
        ShareAction::View => {
            let data = payload
                .data
                .as_ref()
                .ok_or_else(|| ParseError::malformed("VIEW carries no data reference"))?;
            vec![Uploadable::file(data.clone())?]
        }
        ShareAction::Unknown(other) => {
            log::warn!("Unsupported share action: {}", other);
            return Err(ParseError::malformed(&format!(
                "unsupported share action {}",
                other
            )));
        }
    };

    if uploadables.is_empty() {
        return Err(ParseError::malformed("share payload resolved to nothing"));
    }

    log::debug!(
        "Resolved {:?} share into {} uploadable(s)",
        action,
        uploadables.len()
    );

    Ok(uploadables)
}

use serde::{Deserialize, Serialize};

/// Current session tokens as exposed by the relay endpoint.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

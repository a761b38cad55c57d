//! Level/design server requests: payload download, design upload, login.
//!
//! All three are form-encoded POSTs answered with a plain body. Requests are
//! blocking and never retried.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Server endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub retrieve_path: String,
    pub save_path: String,
    pub login_path: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fantasticcontraption.com".to_string(),
            retrieve_path: "/retrieveLevel.php".to_string(),
            save_path: "/saveDesign.php".to_string(),
            login_path: "/logIn.php".to_string(),
        }
    }
}

impl RemoteConfig {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Which payload to boot the guest with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadId {
    Design(String),
    Level(String),
}

impl Default for PayloadId {
    /// The design shown when no id is given.
    fn default() -> Self {
        Self::Design("12706185".to_string())
    }
}

impl PayloadId {
    /// Pick from optional design/level ids; a design wins over a level.
    pub fn from_ids(design: Option<&str>, level: Option<&str>) -> Self {
        match (design, level) {
            (Some(id), _) if !id.is_empty() => Self::Design(id.to_string()),
            (_, Some(id)) if !id.is_empty() => Self::Level(id.to_string()),
            _ => Self::default(),
        }
    }

    /// Form fields for the retrieve request.
    pub fn form(&self) -> [(&'static str, &str); 2] {
        match self {
            Self::Design(id) => [("id", id.as_str()), ("loadDesign", "1")],
            Self::Level(id) => [("id", id.as_str()), ("loadDesign", "0")],
        }
    }
}

/// Result of uploading a design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { design_id: String },
    Failed { response: String },
}

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn { user_id: String },
    Failed,
}

/// Blocking client for the level server.
pub struct RemoteClient {
    agent: ureq::Agent,
    config: RemoteConfig,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            config,
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Download a design or level payload, returned verbatim.
    pub fn fetch_payload(&self, id: &PayloadId) -> Result<Vec<u8>> {
        let body = self.post_form(&self.config.retrieve_path, id.form())?;
        tracing::info!(?id, bytes = body.len(), "payload retrieved");
        Ok(body)
    }

    /// Upload design XML produced by the guest's `export`.
    pub fn save_design(&self, xml: &str) -> Result<SaveOutcome> {
        let body = self.post_form(&self.config.save_path, [("xml", xml)])?;
        let text = String::from_utf8_lossy(&body);
        let outcome = parse_save_response(&text);
        tracing::info!(?outcome, "design saved");
        Ok(outcome)
    }

    /// Log in; the server answers with a `<userId>` element on success.
    pub fn login(&self, user: &str, password: &str) -> Result<LoginOutcome> {
        let body = self.post_form(&self.config.login_path, [("userName", user), ("password", password)])?;
        let text = String::from_utf8_lossy(&body);
        match extract_tag(&text, "userId") {
            Some(user_id) => Ok(LoginOutcome::LoggedIn { user_id }),
            None => {
                tracing::warn!("Login failed");
                Ok(LoginOutcome::Failed)
            }
        }
    }

    fn post_form<'a>(&self, path: &str, form: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Vec<u8>> {
        let url = self.config.url(path);
        tracing::debug!(%url, "POST");
        let resp = self
            .agent
            .post(url.as_str())
            .send_form(form)
            .map_err(|e| BridgeError::Remote(format!("POST {}: {}", url, e)))?;
        let mut reader = resp.into_body().into_reader();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Text content of the first `<tag>…</tag>` element, trimmed.
pub fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;
    let value = text[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Interpret the save endpoint's body: a `designId` element or a bare id.
pub fn parse_save_response(text: &str) -> SaveOutcome {
    if let Some(design_id) = extract_tag(text, "designId") {
        return SaveOutcome::Saved { design_id };
    }
    let trimmed = text.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return SaveOutcome::Saved {
            design_id: trimmed.to_string(),
        };
    }
    SaveOutcome::Failed {
        response: trimmed.to_string(),
    }
}

/// Shareable link for a saved design.
pub fn design_link(base: &str, design_id: &str) -> String {
    format!("{}?designId={}", base, design_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_id_selection() {
        assert_eq!(PayloadId::default(), PayloadId::Design("12706185".into()));
        assert_eq!(PayloadId::from_ids(Some("1"), Some("2")), PayloadId::Design("1".into()));
        assert_eq!(PayloadId::from_ids(None, Some("646726")), PayloadId::Level("646726".into()));
        assert_eq!(PayloadId::from_ids(Some(""), None), PayloadId::default());
    }

    #[test]
    fn test_payload_form() {
        assert_eq!(
            PayloadId::Design("12483401".into()).form(),
            [("id", "12483401"), ("loadDesign", "1")]
        );
        assert_eq!(PayloadId::Level("646726".into()).form(), [("id", "646726"), ("loadDesign", "0")]);
    }

    #[test]
    fn test_extract_tag() {
        let xml = "<response><userId> 4242 </userId></response>";
        assert_eq!(extract_tag(xml, "userId"), Some("4242".into()));
        assert_eq!(extract_tag(xml, "designId"), None);
        assert_eq!(extract_tag("<userId></userId>", "userId"), None);
        assert_eq!(extract_tag("<userId>12", "userId"), None);
    }

    #[test]
    fn test_save_response() {
        assert_eq!(
            parse_save_response("<designId>99</designId>"),
            SaveOutcome::Saved { design_id: "99".into() }
        );
        assert_eq!(
            parse_save_response("12706190\n"),
            SaveOutcome::Saved {
                design_id: "12706190".into()
            }
        );
        assert!(matches!(parse_save_response("error: not logged in"), SaveOutcome::Failed { .. }));
        assert!(matches!(parse_save_response(""), SaveOutcome::Failed { .. }));
    }

    #[test]
    fn test_urls() {
        let config = RemoteConfig {
            base_url: "http://localhost:8080/".into(),
            ..Default::default()
        };
        assert_eq!(config.url(&config.login_path), "http://localhost:8080/logIn.php");
        assert_eq!(
            design_link("https://example.org/fcsim/", "7"),
            "https://example.org/fcsim/?designId=7"
        );
    }
}

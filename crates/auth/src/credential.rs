use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::AuthError;

const AUTHORIZED_USER: &str = "authorized_user";

fn authorized_user() -> String {
    AUTHORIZED_USER.into()
}

/// Persisted authorization for the storage backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "type", default = "authorized_user")]
    pub kind: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credential {
    /// Combines the app's client keys with freshly granted tokens.
    pub fn authorized_user(app: &AppCredentials, token: GrantedToken) -> Self {
        Self {
            kind: authorized_user(),
            client_id: app.client_id.clone(),
            client_secret: app.client_secret.clone(),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.kind != AUTHORIZED_USER {
            return Err(AuthError::InvalidCredential(format!(
                "unsupported credential type: {}",
                self.kind
            )));
        }
        if self.access_token.trim().is_empty() {
            return Err(AuthError::InvalidCredential("missing access token".into()));
        }
        Ok(())
    }

    /// Token to present as `Authorization: Bearer <token>`.
    pub fn bearer(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Tokens returned by an interactive flow.
#[derive(Clone, PartialEq, Eq)]
pub struct GrantedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for GrantedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantedToken").finish_non_exhaustive()
    }
}

/// Operator-provisioned client identity used to start an interactive flow.
#[derive(Clone, Deserialize)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".into()
}

/// On-disk shape: the client keys live under `installed` or `web`.
#[derive(Deserialize)]
struct AppCredentialsFile {
    installed: Option<AppCredentials>,
    web: Option<AppCredentials>,
}

impl AppCredentials {
    /// Reads the app credentials file. Never written by this crate.
    pub async fn load(path: &Path) -> Result<Self, AuthError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| AuthError::AppCredentials {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
        Self::from_json(&content).map_err(|e| AuthError::AppCredentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(content: &str) -> Result<Self, AuthError> {
        let file: AppCredentialsFile = serde_json::from_str(content)?;
        let app = file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidCredential("expected an \"installed\" or \"web\" section".into())
        })?;
        if app.client_id.is_empty() {
            return Err(AuthError::InvalidCredential("missing client_id".into()));
        }
        Ok(app)
    }
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("client_id", &self.client_id)
            .field("auth_uri", &self.auth_uri)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_section_is_used() {
        let app = AppCredentials::from_json(
            r#"{"installed":{"client_id":"cid","client_secret":"sec","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();
        assert_eq!(app.client_id, "cid");
        assert_eq!(app.client_secret, "sec");
        assert_eq!(app.auth_uri, "https://accounts.google.com/o/oauth2/auth");
        assert_eq!(app.redirect_uris, ["http://localhost"]);
    }

    #[test]
    fn web_section_is_accepted() {
        let app = AppCredentials::from_json(
            r#"{"web":{"client_id":"w","client_secret":"s","auth_uri":"https://auth.example/x"}}"#,
        )
        .unwrap();
        assert_eq!(app.client_id, "w");
        assert_eq!(app.auth_uri, "https://auth.example/x");
    }

    #[test]
    fn missing_section_is_rejected() {
        let err = AppCredentials::from_json(r#"{"other":{}}"#).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[test]
    fn credential_serializes_type_field() {
        let app = AppCredentials::from_json(
            r#"{"installed":{"client_id":"cid","client_secret":"sec"}}"#,
        )
        .unwrap();
        let cred = Credential::authorized_user(
            &app,
            GrantedToken {
                access_token: "at".into(),
                refresh_token: Some("rt".into()),
            },
        );
        let json: serde_json::Value = serde_json::to_value(&cred).unwrap();
        assert_eq!(json["type"], "authorized_user");
        assert_eq!(json["client_id"], "cid");
        assert_eq!(json["refresh_token"], "rt");
        assert!(cred.validate().is_ok());
    }

    #[test]
    fn empty_access_token_is_invalid() {
        let cred: Credential = serde_json::from_str(r#"{"type":"authorized_user"}"#).unwrap();
        assert!(matches!(
            cred.validate(),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cred = Credential {
            kind: "authorized_user".into(),
            client_id: "cid".into(),
            client_secret: "very-secret".into(),
            access_token: "bearer-token".into(),
            refresh_token: Some("refresh".into()),
        };
        let text = format!("{cred:?}");
        assert!(!text.contains("very-secret"));
        assert!(!text.contains("bearer-token"));
        assert!(!text.contains("\"refresh\""));
    }
}

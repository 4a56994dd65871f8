//! Interactive authorization flow.

use std::future::Future;
use std::pin::Pin;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::AuthError;
use crate::credential::{AppCredentials, GrantedToken};

/// A boxed future returned by authorization methods.
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + Send + 'a>>;

/// Obtains tokens from the storage provider with operator involvement.
///
/// Only invoked when no usable credential is stored.
pub trait InteractiveFlow: Send + Sync + 'static {
    fn authorize<'a>(
        &'a self,
        app: &'a AppCredentials,
        scopes: &'a [String],
    ) -> AuthFuture<'a, GrantedToken>;
}

/// Prints a consent URL and reads the granted token from stdin.
///
/// The operator opens the URL, approves access and pastes
/// `<access_token> [refresh_token]` back into the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleFlow;

impl InteractiveFlow for ConsoleFlow {
    fn authorize<'a>(
        &'a self,
        app: &'a AppCredentials,
        scopes: &'a [String],
    ) -> AuthFuture<'a, GrantedToken> {
        Box::pin(async move {
            let url = consent_url(app, scopes);
            tracing::warn!(%url, "storage authorization required");

            let mut stdout = tokio::io::stdout();
            let prompt = format!(
                "\nAuthorize this app by visiting:\n\n  {url}\n\nPaste the access token (and optional refresh token): "
            );
            stdout.write_all(prompt.as_bytes()).await?;
            stdout.flush().await?;

            let mut line = String::new();
            let n = BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await?;
            if n == 0 {
                return Err(AuthError::Flow("stdin closed before a token was entered".into()));
            }
            parse_token_line(&line)
        })
    }
}

/// Builds the provider consent URL for `app`.
pub fn consent_url(app: &AppCredentials, scopes: &[String]) -> String {
    let redirect = app
        .redirect_uris
        .first()
        .map(String::as_str)
        .unwrap_or("http://localhost");
    let scope = scopes.join(" ");
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=token&scope={}",
        app.auth_uri,
        utf8_percent_encode(&app.client_id, NON_ALPHANUMERIC),
        utf8_percent_encode(redirect, NON_ALPHANUMERIC),
        utf8_percent_encode(&scope, NON_ALPHANUMERIC),
    )
}

/// Parses `<access_token> [refresh_token]`.
pub fn parse_token_line(line: &str) -> Result<GrantedToken, AuthError> {
    let mut parts = line.split_whitespace();
    let access_token = parts
        .next()
        .ok_or_else(|| AuthError::Flow("no token entered".into()))?
        .to_string();
    let refresh_token = parts.next().map(str::to_string);
    if parts.next().is_some() {
        return Err(AuthError::Flow(
            "expected an access token and at most one refresh token".into(),
        ));
    }
    Ok(GrantedToken {
        access_token,
        refresh_token,
    })
}

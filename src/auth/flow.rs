//! Interactive OAuth2 PKCE login against auth.openai.com
//!
//! Copy-paste flow: the user opens the authorization URL, signs in, and pastes
//! the localhost redirect URL (which does not need to load) back into the
//! terminal.

use chrono::Utc;
use reqwest::Client;
use url::Url;
use crate::Result;
use crate::error::Error;
use super::credentials::{account_id_from_jwt, TokenRecord};
use super::pkce::{generate_state, PkcePair};
use super::token_manager::{describe_oauth_error, parse_grant, CLIENT_ID, TOKEN_URL};

const AUTHORIZE_URL: &str = "https://auth.openai.com/oauth/authorize";
const REDIRECT_URI: &str = "http://localhost:1455/auth/callback";
const SCOPE: &str = "openid profile email offline_access";

/// First half of a login: where to send the user and what to remember.
#[derive(Debug, Clone)]
pub struct LoginStart {
    pub authorization_url: String,
    pub code_verifier: String,
    pub state: String,
}

/// OAuth2 PKCE login flow
#[derive(Clone)]
pub struct LoginFlow {
    client_id: String,
    redirect_uri: String,
    http: Client,
}

impl LoginFlow {
    pub fn new() -> Self {
        Self {
            client_id: CLIENT_ID.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            http: Client::new(),
        }
    }

    /// Generate the authorization URL and PKCE values
    pub fn start(&self) -> Result<LoginStart> {
        let pkce = PkcePair::new();
        let state = generate_state();
        let authorization_url = self.build_auth_url(&pkce.challenge, &state)?;

        Ok(LoginStart {
            authorization_url,
            code_verifier: pkce.verifier,
            state,
        })
    }

    fn build_auth_url(&self, code_challenge: &str, state: &str) -> Result<String> {
        let mut url = Url::parse(AUTHORIZE_URL)
            .map_err(|e| Error::OAuth(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", SCOPE)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .append_pair("id_token_add_organizations", "true")
            .append_pair("codex_cli_simplified_flow", "true")
            .append_pair("originator", "quill");

        Ok(url.to_string())
    }

    /// Exchange whatever the user pasted for a token record
    pub async fn exchange_code(
        &self,
        input: &str,
        code_verifier: &str,
        expected_state: Option<&str>,
    ) -> Result<TokenRecord> {
        let code = parse_authorization_input(input, expected_state)?
            .ok_or_else(|| Error::OAuth("Missing authorization code".to_string()))?;

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("code", code.as_str()),
                ("code_verifier", code_verifier),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::OAuth(format!(
                "OAuth token exchange failed ({}): {}",
                status.as_u16(),
                describe_oauth_error(&body)
            )));
        }

        let grant = parse_grant(&body).map_err(|e| match e {
            Error::Refresh(message) if message.contains("expires_in") => Error::OAuth(message),
            _ => Error::OAuth("Token response missing required fields".to_string()),
        })?;
        let expires_at = grant
            .expires_at(Utc::now())
            .map_err(|e| Error::OAuth(e.to_string()))?;
        let account_id = account_id_from_jwt(&grant.access_token).ok_or_else(|| {
            Error::OAuth("Failed to extract account_id from access token".to_string())
        })?;

        Ok(TokenRecord {
            expires: Some(expires_at.timestamp()),
            access: grant.access_token,
            refresh: Some(grant.refresh_token),
            account_id: Some(account_id),
        })
    }
}

impl Default for LoginFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the authorization code out of a redirect URL, `code#state`,
/// a bare query string, or a raw code.
pub fn parse_authorization_input(
    input: &str,
    expected_state: Option<&str>,
) -> Result<Option<String>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    if let Ok(url) = Url::parse(input) {
        if url.query().is_some() {
            let mut code = None;
            let mut state = None;
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "code" => code = Some(value.into_owned()),
                    "state" => state = Some(value.into_owned()),
                    _ => {}
                }
            }
            check_state(state.as_deref(), expected_state)?;
            if code.is_some() {
                return Ok(code);
            }
        }
    }

    if let Some((code, state)) = input.split_once('#') {
        check_state(Some(state), expected_state)?;
        return Ok(Some(code.to_string()));
    }

    if input.contains("code=") {
        let mut code = None;
        let mut state = None;
        for (key, value) in url::form_urlencoded::parse(input.as_bytes()) {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }
        check_state(state.as_deref(), expected_state)?;
        return Ok(code);
    }

    Ok(Some(input.to_string()))
}

fn check_state(actual: Option<&str>, expected: Option<&str>) -> Result<()> {
    match (actual, expected) {
        (Some(actual), Some(expected)) if actual != expected => {
            Err(Error::OAuth("State mismatch".to_string()))
        }
        _ => Ok(()),
    }
}

//! Token cache records and their storage
//!
//! Tokens are cached per provider in a JSON object, by default at
//! ~/.quill/providers.json:
//!
//! ```json
//! { "openai_oauth_responses": { "access": "...", "refresh": "...", "expires": 1700000000 } }
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use crate::Result;
use crate::error::Error;

/// JWT claim carrying the ChatGPT account metadata.
const JWT_AUTH_CLAIM: &str = "https://api.openai.com/auth";

/// One provider's cached credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(alias = "access_token")]
    pub access: String,

    #[serde(default, alias = "refresh_token", skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,

    /// Absolute expiry in epoch seconds; absent means "already expired"
    #[serde(default, alias = "expires_at", skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl TokenRecord {
    /// Parse the inline form `type="oauth"&refresh="r"&access="a"&expires=123`.
    pub fn from_auth_string(auth: &str) -> Result<Self> {
        let mut access = None;
        let mut refresh = None;
        let mut expires = None;
        let mut account_id = None;

        for pair in auth.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k.trim(), strip_quotes(v.trim())),
                None => continue,
            };
            match key {
                "access" => access = Some(value.to_string()),
                "refresh" => refresh = Some(value.to_string()),
                "account_id" => account_id = Some(value.to_string()),
                "expires" => {
                    let secs = value.parse::<i64>().map_err(|_| {
                        Error::Config(format!("Invalid 'expires' value in auth string: {value}"))
                    })?;
                    expires = Some(secs);
                }
                _ => {}
            }
        }

        let access = access.filter(|a| !a.is_empty()).ok_or_else(|| {
            Error::Config("auth string must contain 'access' parameter".to_string())
        })?;

        Ok(Self {
            access,
            refresh: refresh.filter(|r| !r.is_empty()),
            expires,
            account_id,
        })
    }
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

/// Extract `chatgpt_account_id` from an access token's JWT payload.
///
/// Returns `None` for anything that is not a well-formed JWT carrying the claim.
pub fn account_id_from_jwt(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&payload).ok()?;

    claims
        .get(JWT_AUTH_CLAIM)?
        .get("chatgpt_account_id")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Durable storage for cached tokens, keyed by provider
pub trait TokenStore: Send + Sync {
    fn load(&self, provider: &str) -> Result<Option<TokenRecord>>;
    fn save(&self, provider: &str, record: &TokenRecord) -> Result<()>;
    fn remove(&self, provider: &str) -> Result<()>;
}

/// JSON-file token store
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location
    pub fn default_location() -> Self {
        Self::new(crate::config::config_dir().join("providers.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Config(format!(
                "Token cache at {:?} is not a JSON object",
                self.path
            ))),
        }
    }

    fn write_all(&self, entries: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, provider: &str) -> Result<Option<TokenRecord>> {
        let mut entries = self.read_all()?;
        match entries.remove(provider) {
            Some(entry) => Ok(Some(serde_json::from_value(entry)?)),
            None => Ok(None),
        }
    }

    fn save(&self, provider: &str, record: &TokenRecord) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(provider.to_string(), serde_json::to_value(record)?);
        self.write_all(&entries)
    }

    fn remove(&self, provider: &str) -> Result<()> {
        let mut entries = self.read_all()?;
        if entries.remove(provider).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn fake_jwt(account_id: &str) -> String {
    let mut claims = Map::new();
    claims.insert(
        JWT_AUTH_CLAIM.to_string(),
        serde_json::json!({ "chatgpt_account_id": account_id }),
    );
    format!(
        "e30.{}.sig",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_auth_string_with_quotes() {
        let record =
            TokenRecord::from_auth_string(r#"type="oauth"&refresh="wer"&access="abc"&expires=123"#)
                .unwrap();
        assert_eq!(record.access, "abc");
        assert_eq!(record.refresh.as_deref(), Some("wer"));
        assert_eq!(record.expires, Some(123));
        assert_eq!(record.account_id, None);
    }

    #[test]
    fn test_auth_string_requires_access() {
        let err = TokenRecord::from_auth_string("refresh=r&expires=1").unwrap_err();
        assert!(err.to_string().contains("'access'"));
    }

    #[test]
    fn test_auth_string_without_expiry() {
        let record = TokenRecord::from_auth_string("access=a").unwrap();
        assert_eq!(record.expires, None);
        assert_eq!(record.refresh, None);
    }

    #[test]
    fn test_record_accepts_long_field_names() {
        let record: TokenRecord = serde_json::from_str(
            r#"{"model_key":"m","access_token":"a","refresh_token":"r","expires_at":5}"#,
        )
        .unwrap();
        assert_eq!(record.access, "a");
        assert_eq!(record.refresh.as_deref(), Some("r"));
        assert_eq!(record.expires, Some(5));
    }

    #[test]
    fn test_record_null_expiry() {
        let record: TokenRecord =
            serde_json::from_str(r#"{"access":"a","refresh":"r","expires":null}"#).unwrap();
        assert_eq!(record.expires, None);
    }

    #[test]
    fn test_account_id_from_jwt() {
        assert_eq!(account_id_from_jwt(&fake_jwt("acct_1")).as_deref(), Some("acct_1"));
        assert_eq!(account_id_from_jwt("not-a-jwt"), None);
        assert_eq!(account_id_from_jwt("a.!!!.c"), None);
    }

    #[test]
    fn test_file_store_roundtrip_keeps_other_providers() {
        let tmp = TempDir::new().unwrap();
        let store = FileTokenStore::new(tmp.path().join("providers.json"));
        let record = TokenRecord {
            access: "a".into(),
            refresh: Some("r".into()),
            expires: Some(10),
            account_id: None,
        };

        store.save("one", &record).unwrap();
        store.save("two", &record).unwrap();
        store.remove("one").unwrap();

        assert_eq!(store.load("one").unwrap(), None);
        assert_eq!(store.load("two").unwrap(), Some(record));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let store = FileTokenStore::new(tmp.path().join("providers.json"));
        store
            .save("p", &TokenRecord::from_auth_string("access=a").unwrap())
            .unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

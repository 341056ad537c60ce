//! Authentication module for OAuth2 and credential management
//!
//! This module provides:
//! - PKCE code generation for OAuth2 flows
//! - Token cache records and the store they persist through
//! - TokenManager, which keeps an access token valid and refreshes it
//! - The interactive login flow

mod pkce;
mod credentials;
mod flow;
mod token_manager;

pub use credentials::{account_id_from_jwt, FileTokenStore, TokenRecord, TokenStore};
pub use flow::{parse_authorization_input, LoginFlow, LoginStart};
pub use token_manager::{
    HttpTokenEndpoint, RefreshCallback, TokenEndpoint, TokenGrant, TokenManager, TokenState,
    CLIENT_ID, TOKEN_URL,
};

#[cfg(test)]
pub(crate) use credentials::fake_jwt;
#[cfg(test)]
pub(crate) use token_manager::test_support;

//! Bearer-token session primitives
//!
//! Provides the token types, the persistent token store, and the client for
//! the backend's token endpoints. This crate knows nothing about request
//! retry or refresh coordination; `session-client` builds those on top.
//!
//! Token flow:
//! 1. Operator signs in via `exchange::login()` and receives a `TokenPair`
//! 2. The pair is persisted through a `TokenStore` (`FileTokenStore` on disk)
//! 3. When the backend rejects the access token, `TokenExchange::refresh()`
//!    trades the refresh token for a new pair
//! 4. The rotated pair replaces the stored one via `TokenStore::save()`

pub mod constants;
pub mod error;
pub mod exchange;
pub mod store;
pub mod tokens;

pub use constants::*;
pub use error::{Error, Result};
pub use exchange::{
    HttpTokenExchange, Registration, TokenExchange, api_url, login, refresh_token, register,
};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use tokens::{Session, TokenPair, TokenResponse};

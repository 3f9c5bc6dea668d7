// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # icasync Fetch
//!
//! Network layer for the icasync workspace: the HTTP client wrapper, the
//! OAuth-with-PKCE authenticator, the typed vendor API client and the
//! external nutrition lookup.
//!
//! ## Components
//!
//! - [`HttpClient`] — reqwest wrapper with fixed timeouts, a cookie store
//!   and a non-redirecting client for the authorize legs
//! - [`IcaAuthenticator`] — the multi-step login/refresh state machine
//!   producing an `AuthState`
//! - [`IcaApi`] — one typed method per vendor endpoint, no business logic
//! - [`NutritionClient`] — Open Food Facts barcode fallback
//!
//! ## Example
//!
//! ```ignore
//! use icasync_core::AuthCredentials;
//! use icasync_fetch::{IcaApi, IcaAuthenticator};
//!
//! let credentials = AuthCredentials::new("198001019999", "secret");
//! let mut authenticator = IcaAuthenticator::new(credentials, None)?;
//! let state = authenticator.ensure_login(false).await?;
//!
//! let api = IcaApi::new()?;
//! api.set_auth_key(state.access_token().unwrap()).await;
//! let lists = api.get_shopping_lists().await?;
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod jwt;
pub mod nutrition;
pub mod pkce;

pub use api::{IcaApi, ProductCategory, Recipe, DEFAULT_API_BASE};
pub use auth::{IcaAuthenticator, DEFAULT_AUTH_BASE};
pub use client::HttpClient;
pub use error::FetchError;
pub use nutrition::{NutritionClient, DEFAULT_NUTRITION_BASE};
pub use pkce::PkcePair;

// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # icasync Core
//!
//! Core types, models and the diff engine for the icasync workspace.
//!
//! This crate provides the foundational abstractions used by the fetch,
//! store and coordinator crates:
//!
//! - Session types ([`AuthCredentials`], [`OAuthClient`], [`OAuthToken`],
//!   [`AuthState`]) — the durable snapshot of one account's OAuth session
//! - Domain records for the vendor API (shopping lists, baseitems, offers,
//!   stores, product lookups)
//! - The keyed diff engine ([`get_diffs`]) driving change-notification
//!   events
//! - Domain events ([`IcaEvent`]) consumed by external listeners

pub mod diff;
pub mod error;
pub mod events;
pub mod models;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Session types
    AuthCredentials,
    AuthState,
    JwtUserInfo,
    OAuthClient,
    OAuthToken,
    // Shopping types
    Article,
    BaseItem,
    ConflictResolution,
    CurrentBonus,
    ShoppingList,
    ShoppingListRow,
    ShoppingListSync,
    Store,
    // Offer types
    Offer,
    StoreOffers,
    // Product types
    NutritionFacts,
    ProductLookup,
    ProductRegistryEntry,
};

// Re-export diff engine
pub use diff::{get_diffs, Diff, DiffOp};

// Re-export events
pub use events::IcaEvent;

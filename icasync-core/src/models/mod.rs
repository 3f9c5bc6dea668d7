//! Domain models for icasync.
//!
//! Typed records replacing the vendor's loosely-shaped JSON payloads.
//! Session types live in [`auth`], shopping-list and account data in
//! [`shopping`], promotional offers in [`offers`] and cross-referenced
//! product facts in [`product`].

pub mod auth;
pub mod offers;
pub mod product;
pub mod shopping;

pub use auth::{AuthCredentials, AuthState, JwtUserInfo, OAuthClient, OAuthToken};
pub use offers::{Offer, StoreOffers};
pub use product::{NutritionFacts, ProductLookup, ProductRegistryEntry};
pub use shopping::{
    Article, BaseItem, ConflictResolution, CurrentBonus, ShoppingList, ShoppingListRow,
    ShoppingListSync, Store,
};

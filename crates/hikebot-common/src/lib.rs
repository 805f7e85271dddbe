//! Shared domain types for HikeBot.
//!
//! Used by the API server, the dashboard and the trail seeder so that all
//! three agree on the wire shape of users, groups, messages and trip cards.

pub mod fuzzy;
pub mod models;
pub mod trip_card;

pub use models::*;
pub use trip_card::{TripCard, TripStats};

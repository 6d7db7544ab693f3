//! Core domain types for the automation service.

mod ids;

pub use ids::{DeliveryId, EntityId};

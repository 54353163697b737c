//! # Property Graph Model
//!
//! Read-side DTOs for the property graph the filter engine queries.
//! These types cross every boundary: store ↔ session ↔ normalizer ↔ caller.
//!
//! This module is pure data with no I/O and no async.

pub mod node;
pub mod relationship;
pub mod path;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId, Labels};
pub use relationship::{Relationship, RelId};
pub use path::Path;
pub use value::Value;
pub use property_map::{PropertyMap, property_map};

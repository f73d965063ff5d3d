//! Shared vocabulary for the RailsPress theme builder: the composition
//! graph, entity addressing, id generation and the error taxonomy.

pub mod entity;
pub mod error;
pub mod ids;
pub mod model;
pub mod visitor;

pub use entity::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use visitor::*;

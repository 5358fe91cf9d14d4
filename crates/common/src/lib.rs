//! Identifier types shared by every crate in the order services workspace.

mod types;

pub use types::{OrderId, ProductId, UserId};

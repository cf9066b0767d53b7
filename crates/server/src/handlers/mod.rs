//! HTTP request handlers.

pub mod common;
pub mod content;
pub mod health;
pub mod promotion;
pub mod stores;

pub use content::*;
pub use health::*;
pub use promotion::*;
pub use stores::*;

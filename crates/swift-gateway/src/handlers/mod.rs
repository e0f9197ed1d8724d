//! HTTP request handlers

pub mod container;
pub mod object;
pub mod service;

pub use container::*;
pub use object::*;
pub use service::*;

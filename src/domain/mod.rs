//! Tools and discovery metadata exposed by the server

pub mod metadata;
pub mod tools;

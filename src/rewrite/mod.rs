// src/rewrite/mod.rs
//! Persona-voiced rewrite/reply generation for selected posts.

pub mod adapter;
pub mod prompt;

pub use adapter::{build_client_from_config, DynRewriteClient, RewriteClient};
pub use prompt::{Persona, RewriteMode, RewriteRequest};

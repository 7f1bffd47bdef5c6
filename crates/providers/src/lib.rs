//! Completion provider implementations for Ragent.
//!
//! All providers implement the `ragent_core::Provider` trait.
//! [`factory::build_from_config`] picks one based on configuration.

pub mod factory;
pub mod openai_compat;

pub use factory::build_from_config;
pub use openai_compat::OpenAiCompatProvider;

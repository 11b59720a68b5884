//! Completion provider implementations for Shihui.
//!
//! All providers implement the `shihui_core::Provider` trait.
//! The router maps model ids from configuration to providers.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, ModelRoute, ModelRouter};

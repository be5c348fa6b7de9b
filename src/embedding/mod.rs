// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns text into unit-length vectors
//!
//! Providers wrap a local model, a remote API or an external command behind
//! one batch interface; the shared holder builds the provider once per engine.

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub mod builtin;
pub mod provider;
pub mod shared;
pub mod vector;

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use builtin::{EmbeddingProviderConfig, FastEmbedder};
pub use provider::{
    create_provider, CommandProvider, DummyProvider, EmbeddingProvider, HashProvider,
    HttpProvider,
};
pub use shared::SharedProvider;
pub use vector::{cosine_similarity, l2_normalize};

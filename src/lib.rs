// SPDX-License-Identifier: MIT OR Apache-2.0

//! ragmatch - Semantic retrieval and skill matching library
//!
//! Shared modules for the ragmatch CLI tool.

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod expand;
pub mod index;
pub mod matcher;
pub mod output;
pub mod process;
pub mod profile;
pub mod ranking;
pub mod utils;

#[cfg(test)]
mod testutil;

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexer module - corpus ingestion

pub mod ingest;

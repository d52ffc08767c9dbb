// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction strategies over the portal's semi-structured markup.
//!
//! Each extractor is total: unexpected markup degrades to "no data" for
//! that unit of work, never to a thrown condition.

pub mod documents;
pub mod partial;
pub mod results;

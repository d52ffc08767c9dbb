// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the handelsregister binary.

pub mod cache_cmd;
pub mod fetch_cmd;
pub mod output;
pub mod search_cmd;

// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Search and document extraction for the German company register portal.
//!
//! This library crate exposes the core modules for integration testing.

#![allow(clippy::new_without_default)]

pub mod artifact;
pub mod cache;
pub mod cli;
pub mod engine;
pub mod error;
pub mod extract;
pub mod matcher;
pub mod model;
pub mod navigator;
pub mod session;

// Copyright 2026 FeedRelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! FeedRelay runtime library — supervised browser sessions that relay a live
//! on-page signal into an append-only store.
//!
//! This library crate exposes the runtime modules for the binary and for
//! integration testing.

pub mod cli;
pub mod clock;
pub mod config;
pub mod driver;
pub mod events;
pub mod extractor;
pub mod locator;
pub mod runner;
pub mod selectors;
pub mod session;
pub mod sink;
pub mod supervisor;
pub mod telemetry;

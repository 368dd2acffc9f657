// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The two reconciliation workers: the event-driven collector and the
//! timer-driven reloader.

pub mod collector;
pub mod reloader;

pub use collector::Collector;
pub use reloader::Reloader;

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod parser;
pub mod server;
pub mod store;
pub mod types;
pub mod vault;
pub mod workers;

#[cfg(test)]
pub mod test_utils;

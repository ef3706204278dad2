//! Pennywise - A personal expense tracker
//!
//! This library provides the core functionality shared by the `pennywise`
//! server and the `adduser` tool.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

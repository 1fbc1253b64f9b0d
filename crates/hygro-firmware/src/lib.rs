//! ESP32-S3 firmware-specific modules for hygro-rs
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: the GPIO data line for the DHT11, the embassy-backed wall clock,
//! and the SD-card blob store the history is persisted to.

#![no_std]

extern crate alloc;

pub mod data_line;
pub mod sd_store;
pub mod wall_clock;

//! Hardware-independent core library for hygro-rs
//!
//! This crate contains all platform-agnostic logic for the hygro humidity and
//! temperature logger: the DHT11 single-wire transceiver, frame validation,
//! daily extremes tracking, the day rollover engine and its persistence adapter,
//! and the periodic monitor that ties them together.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod clock;
pub mod config;
pub mod monitor;
pub mod sensors;
pub mod storage;

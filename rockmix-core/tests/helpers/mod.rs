//! Shared fixtures for integration tests
//!
//! `device` builds temp directories shaped like a mounted Rockbox player,
//! TagCache database included. `backend` serves fake external APIs on
//! loopback ports so the HTTP clients run their full request paths.

pub mod backend;
pub mod device;

pub use backend::{spawn, Hits};
pub use device::{FakeDevice, Track};

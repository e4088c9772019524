//! TMP core — frame kinds and the fixed-width wire envelope for the TMP
//! chat protocol.
//!
//! This crate is the pure protocol layer: no I/O, no async. The broker in
//! `tmp-server` and any Rust client build and parse frames through the
//! types here.

pub mod frame;
pub mod kind;

pub use frame::{Frame, FrameError, HEADER_LEN, MAX_NAME_LEN};
pub use kind::{FrameKind, Origin};

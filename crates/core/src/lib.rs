//! Core library for deck
//!
//! This crate contains the local-first board engine:
//! - Resource model (cards, tasks, preferences)
//! - Local store and snapshot persistence
//! - Diff engine, remote call dispatcher and sync coordinator

pub mod error;
pub mod resource;
pub mod store;
pub mod sync;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

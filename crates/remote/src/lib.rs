//! HTTP implementation of the deck remote API

mod client;

pub use client::{RestClient, RestClientConfig, DEFAULT_BASE_URL};

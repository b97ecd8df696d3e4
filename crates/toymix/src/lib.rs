//! toymix - recipe ingestion, batch driver and run logging around
//! [`toymix_core`]

pub mod batch_mix;
pub mod config;
pub mod logging;
pub mod recipe;

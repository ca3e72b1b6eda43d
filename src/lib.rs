pub(crate) mod api;
pub mod config;
pub mod error;
pub mod observability;
pub mod routing;
pub mod state;
pub mod transcode;
pub mod transport;

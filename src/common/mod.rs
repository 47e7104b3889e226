pub(crate) mod activations;
pub mod config;
pub mod error;
pub(crate) mod layers;

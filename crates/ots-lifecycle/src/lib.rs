//! ots-lifecycle: the share/reveal state machine on top of ots-crypto and
//! an [`ots_backend::SecretBackend`]

pub mod controller;

pub use controller::SecretClient;

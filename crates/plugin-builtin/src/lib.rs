//! Compiled-in behaviors for Hookwire.
//!
//! These units ship inside the server binary and are registered into the
//! static registry during setup, before the registry is sealed. They are
//! available even when hot loading is disabled or unsupported.

pub mod hooks;
pub mod plugin;

pub use plugin::register_all;

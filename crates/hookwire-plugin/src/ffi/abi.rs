//! Entry-point ABI for dynamically loaded units.
//!
//! A unit exports two symbols, both generated by
//! [`export_plugin!`](crate::export_plugin):
//!
//! ```c
//! uint32_t hookwire_abi_version();
//! PluginRegistration* hookwire_plugin_register();
//! ```
//!
//! The registration is a Rust value passed by pointer, so the unit must be
//! built with the same toolchain and the same `hookwire-plugin` version as
//! the host. The version symbol is checked before the entry symbol is
//! called; ownership of the returned box moves to the host.

use crate::exports::PluginRegistration;

/// Bumped whenever [`PluginRegistration`] or the behavior trait changes shape.
pub const ABI_VERSION: u32 = 1;

/// Self-registration entry symbol.
pub const ENTRY_SYMBOL: &[u8] = b"hookwire_plugin_register";

/// ABI version symbol.
pub const ABI_VERSION_SYMBOL: &[u8] = b"hookwire_abi_version";

/// Type signature of the entry symbol.
///
/// Returns a heap-allocated registration produced with `Box::into_raw`.
#[allow(improper_ctypes_definitions)]
pub type RegisterFn = unsafe extern "C" fn() -> *mut PluginRegistration;

/// Type signature of the ABI version symbol.
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Returns the printable form of a symbol name.
pub fn symbol_name(symbol: &[u8]) -> String {
    String::from_utf8_lossy(symbol).into_owned()
}

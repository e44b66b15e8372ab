//! FFI boundary between the host and dynamically loaded units.

pub mod abi;

pub use abi::{ABI_VERSION, ABI_VERSION_SYMBOL, AbiVersionFn, ENTRY_SYMBOL, RegisterFn};

//! Convenience macros for plugin development.

/// Exports the self-registration entry point of a dynamically loaded unit.
///
/// Generates `hookwire_plugin_register` and `hookwire_abi_version`. The
/// expression is evaluated on every load and must produce a
/// [`PluginRegistration`](crate::exports::PluginRegistration).
///
/// # Example
/// ```rust,ignore
/// export_plugin!(
///     PluginRegistration::new("example_hotload", || Arc::new(ExampleHotload) as Arc<dyn Behavior>)
///         .with_metadata(BehaviorMetadata::new("example_hotload").at(hook))
/// );
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($registration:expr) => {
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn hookwire_plugin_register() -> *mut $crate::exports::PluginRegistration {
            let registration: $crate::exports::PluginRegistration = $registration;
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(registration))
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn hookwire_abi_version() -> u32 {
            $crate::ffi::abi::ABI_VERSION
        }
    };
}

/// Parses a hook point key literal, panicking on a malformed one.
///
/// Intended for literals in plugin setup and tests.
///
/// # Example
/// ```rust,ignore
/// let hook = hook_key!("widget.after.create");
/// ```
#[macro_export]
macro_rules! hook_key {
    ($key:literal) => {
        match $key.parse::<$crate::hooks::definitions::HookKey>() {
            Ok(key) => key,
            Err(_) => panic!(concat!("invalid hook point key: ", $key)),
        }
    };
}

/// Builds an `EventRecord` with field data.
///
/// # Example
/// ```rust,ignore
/// let event = event_record!("widget", After, Create, {
///     "NAME" => json!("gear"),
/// });
/// ```
#[macro_export]
macro_rules! event_record {
    ($entity:expr, $timing:ident, $action:ident) => {
        $crate::hooks::definitions::EventRecord::new(
            $entity,
            $crate::hooks::definitions::Timing::$timing,
            $crate::hooks::definitions::Action::$action,
        )
    };
    ($entity:expr, $timing:ident, $action:ident, { $($key:expr => $value:expr),* $(,)? }) => {{
        let mut event = $crate::event_record!($entity, $timing, $action);
        $(
            event.data.insert($key.to_string(), $value);
        )*
        event
    }};
}

#[cfg(test)]
mod tests {
    use crate::hooks::definitions::{Action, Timing};

    #[test]
    fn test_hook_key_macro() {
        let key = hook_key!("widget.before.submit");
        assert_eq!(key.timing, Timing::Before);
        assert_eq!(key.action, Action::Submit);
    }

    #[test]
    fn test_event_record_macro() {
        let event = event_record!("widget", After, Update, {
            "NAME" => serde_json::json!("gear"),
            "QTY" => serde_json::json!(3),
        });
        assert_eq!(event.hook_key().to_string(), "widget.after.update");
        assert_eq!(event.field_str("NAME"), Some("gear"));
        assert_eq!(event.data.len(), 2);
    }
}

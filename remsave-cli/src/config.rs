use std::env;
use std::sync::LazyLock;

fn flag(name: &str) -> bool {
    env::var_os(name).is_some_and(|value| !value.is_empty())
}

pub static DEBUG: LazyLock<bool> = LazyLock::new(|| flag("DEBUG"));
pub static DEBUG_SAVE_BINARY: LazyLock<bool> = LazyLock::new(|| flag("DEBUG_SAVE_BINARY"));
pub static DEBUG_SAVE_JSON: LazyLock<bool> = LazyLock::new(|| flag("DEBUG_SAVE_JSON"));

//! Lazily-read environment verbosity flags. The only mutable
//! process-wide state this crate holds.

use std::env;
use std::sync::OnceLock;

fn flag_set(name: &str) -> bool {
    env::var(name).map(|v| v == "1").unwrap_or(false)
}

/// `COLORD_VERBOSE=1` — enables debug-level tracing across the crate.
pub fn verbose() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| flag_set("COLORD_VERBOSE"))
}

/// `SPARK_PROTOCOL_DEBUG=1` — enables Spark wire hex-dumps.
pub fn spark_protocol_debug() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| flag_set("SPARK_PROTOCOL_DEBUG"))
}

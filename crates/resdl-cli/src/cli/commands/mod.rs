//! CLI command handlers. Each command is in its own file.

mod cancel;
mod get;
mod status;

pub use cancel::run_cancel;
pub use get::run_get;
pub use status::run_status;

/// Human-readable byte count (binary units).
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

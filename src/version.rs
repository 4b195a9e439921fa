//! Library version information.

/// The full version string, e.g. `"0.1.0"`.
pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Major version number.
pub fn major_version() -> u32 {
    env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0)
}

/// Minor version number.
pub fn minor_version() -> u32 {
    env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0)
}

/// Patch level.
pub fn revision() -> u32 {
    env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0)
}

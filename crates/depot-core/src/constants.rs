//! Shared constants for path conventions and defaults.

/// Trailing path segment that turns a directory request into a latest-version lookup.
pub const LATEST_MARKER: &str = "@latest";

/// File name of the synthesized version descriptor.
pub const METADATA_FILE_NAME: &str = "maven-metadata.xml";

/// Reserved directory inside every repository root holding in-flight uploads.
/// Never listed and never addressable through an artifact path.
pub const TEMP_DIR_NAME: &str = ".depot-tmp";

/// Suffix that marks a version as a pre-release development build.
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STORAGE_PATH: &str = "./depot-data";
pub const DEFAULT_MIN_FREE_MB: u64 = 64;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

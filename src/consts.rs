/// 2^64-1, systemd's "unset" marker for 64 bits properties
pub const U64MAX: u64 = 18_446_744_073_709_551_615;
/// 2^32-1, systemd's "unset" marker for 32 bits properties
pub const U32MAX: u64 = 4_294_967_295;

pub const NOT_SET: &str = "[not set]";

pub const SUFFIX_TIMESTAMP: &str = "Timestamp";
pub const SUFFIX_USEC: &str = "USec";
pub const SUFFIX_USEC_REALTIME: &str = "USecRealtime";
pub const SUFFIX_DIRECTORY_MODE: &str = "DirectoryMode";

pub const DEFAULT_HELPER_PATH: &str = "/usr/libexec/sysd-monitor-helper";
pub const DEFAULT_ELEVATE_PROGRAM: &str = "pkexec";
pub const ELEVATE_NO_INTERNAL_AGENT: &str = "--disable-internal-agent";
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

pub const ENV_BUS: &str = "SYSD_MONITOR_BUS";
pub const ENV_HELPER: &str = "SYSD_MONITOR_HELPER";
pub const ENV_ELEVATE: &str = "SYSD_MONITOR_ELEVATE";
pub const ENV_DEBOUNCE_MS: &str = "SYSD_MONITOR_DEBOUNCE_MS";

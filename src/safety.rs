// Device safety validation
//
// The single gate in front of every destructive operation. A target must be
// judged safe before any subprocess that can write to it is spawned. The
// deny table is platform-keyed: Unix device paths and Windows drive/physical
// handles have different shapes, so each platform carries its own exact
// paths, prefixes and substrings.

use crate::Platform;
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct DenyRules {
    exact: &'static [&'static str],
    prefixes: &'static [&'static str],
    substrings: &'static [&'static str],
    case_insensitive: bool,
}

lazy_static! {
    // System-drive patterns per platform. The Unix prefixes are the device
    // names the primary disk conventionally appears under; the Windows rules
    // cover the system volume, the first physical drive and anything that
    // looks like a path into the Windows directory.
    static ref DENY_TABLE: HashMap<Platform, DenyRules> = {
        let mut table = HashMap::new();
        table.insert(
            Platform::Unix,
            DenyRules {
                exact: &["/"],
                prefixes: &["/dev/sda", "/dev/nvme0n1", "/dev/mmcblk0"],
                substrings: &[],
                case_insensitive: false,
            },
        );
        table.insert(
            Platform::Windows,
            DenyRules {
                exact: &[],
                prefixes: &["c:", r"\\.\physicaldrive0"],
                substrings: &["windows"],
                case_insensitive: true,
            },
        );
        table
    };
}

/// Pure predicate over the built-in deny table for `platform`.
pub fn is_safe_target(path: &str, platform: Platform) -> bool {
    SafetyPolicy::new(platform).is_safe_target(path)
}

/// Safety policy for one platform, optionally enriched with host-detected
/// system-disk prefixes. The predicate itself never touches the system.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    platform: Platform,
    extra_prefixes: Vec<String>,
}

impl SafetyPolicy {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            extra_prefixes: Vec::new(),
        }
    }

    /// Policy for the running host. On Linux this also resolves the block
    /// device backing `/` and denies it, so hosts whose root disk is not
    /// covered by the static table (e.g. /dev/sdb, /dev/vda) stay protected.
    pub fn for_host() -> Self {
        let mut policy = Self::new(Platform::current());
        if let Some(root_disk) = detect_root_disk() {
            tracing::debug!(disk = %root_disk, "denying host root disk");
            policy.extra_prefixes.push(root_disk);
        }
        policy
    }

    /// Add a deny prefix beyond the built-in table
    pub fn deny_prefix(&mut self, prefix: impl Into<String>) {
        self.extra_prefixes.push(prefix.into());
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Decide whether `path` may be sanitized. Empty paths, the root
    /// filesystem and anything matching a system-drive pattern are refused.
    pub fn is_safe_target(&self, path: &str) -> bool {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return false;
        }

        let rules = &DENY_TABLE[&self.platform];
        let candidate = if rules.case_insensitive {
            trimmed.to_ascii_lowercase()
        } else {
            trimmed.to_string()
        };

        if rules.exact.iter().any(|p| candidate == *p) {
            return false;
        }
        if rules.prefixes.iter().any(|p| candidate.starts_with(p)) {
            return false;
        }
        if rules.substrings.iter().any(|s| candidate.contains(s)) {
            return false;
        }
        if self.extra_prefixes.iter().any(|p| candidate.starts_with(p)) {
            return false;
        }

        true
    }
}

/// Resolve the whole-disk device backing `/`, e.g. /dev/nvme0n1p2 -> /dev/nvme0n1.
#[cfg(target_os = "linux")]
fn detect_root_disk() -> Option<String> {
    let mounts = procfs::mounts().ok()?;
    let root = mounts.into_iter().find(|m| m.fs_file == "/")?;
    if !root.fs_spec.starts_with("/dev/") {
        // overlay, tmpfs, zfs datasets: nothing to deny by prefix
        return None;
    }
    Some(strip_partition_suffix(&root.fs_spec))
}

#[cfg(not(target_os = "linux"))]
fn detect_root_disk() -> Option<String> {
    None
}

/// /dev/sda2 -> /dev/sda, /dev/nvme0n1p2 -> /dev/nvme0n1, /dev/mmcblk0p1 -> /dev/mmcblk0
fn strip_partition_suffix(device: &str) -> String {
    lazy_static! {
        static ref DISK_RE: regex::Regex =
            regex::Regex::new(r"^(/dev/(?:nvme\d+n\d+|mmcblk\d+|[a-z]+))p?\d*$").unwrap();
    }
    match DISK_RE.captures(device) {
        Some(caps) => caps[1].to_string(),
        None => device.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("" ; "empty path")]
    #[test_case("   " ; "whitespace only")]
    #[test_case("/" ; "root filesystem")]
    #[test_case("/dev/sda" ; "primary disk")]
    #[test_case("/dev/sda1" ; "primary disk partition")]
    #[test_case("/dev/nvme0n1" ; "primary nvme")]
    #[test_case("/dev/nvme0n1p3" ; "primary nvme partition")]
    #[test_case("/dev/mmcblk0p1" ; "primary emmc partition")]
    fn unix_unsafe_targets(path: &str) {
        assert!(!is_safe_target(path, Platform::Unix), "{:?} must be unsafe", path);
    }

    #[test_case("/dev/sdb" ; "second disk")]
    #[test_case("/dev/sdz" ; "mock scan device")]
    #[test_case("/dev/nvme1n1" ; "second nvme")]
    #[test_case("/dev/mmcblk1" ; "second emmc")]
    fn unix_safe_targets(path: &str) {
        assert!(is_safe_target(path, Platform::Unix), "{:?} must be safe", path);
    }

    #[test_case("C:" ; "system volume")]
    #[test_case("c:\\data" ; "system volume path")]
    #[test_case(r"\\.\PhysicalDrive0" ; "first physical drive")]
    #[test_case(r"D:\Windows\old" ; "windows directory")]
    fn windows_unsafe_targets(path: &str) {
        assert!(!is_safe_target(path, Platform::Windows), "{:?} must be unsafe", path);
    }

    #[test_case(r"\\.\PhysicalDrive2" ; "secondary physical drive")]
    #[test_case("E:" ; "removable volume")]
    fn windows_safe_targets(path: &str) {
        assert!(is_safe_target(path, Platform::Windows), "{:?} must be safe", path);
    }

    #[test]
    fn extra_prefix_denies() {
        let mut policy = SafetyPolicy::new(Platform::Unix);
        assert!(policy.is_safe_target("/dev/vdb"));
        policy.deny_prefix("/dev/vdb");
        assert!(!policy.is_safe_target("/dev/vdb"));
        assert!(!policy.is_safe_target("/dev/vdb2"));
    }

    #[test]
    fn partition_suffix_stripping() {
        assert_eq!(strip_partition_suffix("/dev/sda2"), "/dev/sda");
        assert_eq!(strip_partition_suffix("/dev/nvme0n1p2"), "/dev/nvme0n1");
        assert_eq!(strip_partition_suffix("/dev/mmcblk0p1"), "/dev/mmcblk0");
        assert_eq!(strip_partition_suffix("/dev/sdb"), "/dev/sdb");
    }

    proptest! {
        // Anything under a denied prefix is unsafe, whatever the suffix
        #[test]
        fn any_primary_disk_suffix_is_unsafe(suffix in "[0-9a-z]{0,8}") {
            let path = format!("/dev/sda{}", suffix);
            prop_assert!(!is_safe_target(&path, Platform::Unix));
        }

        #[test]
        fn any_system_volume_path_is_unsafe(rest in "[ -~]{0,16}") {
            let path = format!("C:{}", rest);
            prop_assert!(!is_safe_target(&path, Platform::Windows));
        }
    }
}

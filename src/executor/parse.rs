//! Parsers for device CLI output.
//!
//! All parsers are tolerant: they return `None` instead of failing when
//! output does not look as expected, and the engine decides how bad that
//! is.

use regex::Regex;

/// Hardware product id from `show version` output. Matches the inventory
/// line `<slot> <PID> ... (revision ...`.
pub fn product_id(output: &str) -> Option<String> {
    let re = Regex::new(r"\n\w+\s+(\S+)\s+.*\(revision\s+").ok()?;
    re.captures(output).map(|c| c[1].to_string())
}

/// Chassis serial number from `show version` output.
pub fn serial_number(output: &str) -> Option<String> {
    let re = Regex::new(r"\n.*\s+board\s+ID\s+(\S+)").ok()?;
    re.captures(output).map(|c| c[1].to_string())
}

/// Running OS version from `show version` output.
pub fn os_version(output: &str) -> Option<String> {
    let re = Regex::new(r"Version\s+([^,\s]+)").ok()?;
    re.captures(output).map(|c| c[1].to_string())
}

/// Parsed `dir /all` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryListing {
    /// File system name with the trailing slash stripped, e.g. `flash:`.
    pub file_system: String,
    /// Free bytes reported at the bottom of the listing.
    pub total_free: u64,
    /// File names present on the file system.
    pub files: Vec<String>,
}

impl DirectoryListing {
    pub fn contains(&self, filename: &str) -> bool {
        self.files.iter().any(|f| f == filename)
    }
}

/// Parse a `dir /all` listing. Returns `None` when the header or the free
/// space summary is missing.
pub fn directory_listing(output: &str) -> Option<DirectoryListing> {
    let header = Regex::new(r"Directory of\s+(\S+)").ok()?;
    let free = Regex::new(r"\((\d+)\s+bytes\s+free\)").ok()?;
    let file_system = header
        .captures(output)
        .map(|c| c[1].trim_end_matches('/').to_string())?;
    let total_free = free
        .captures(output)
        .and_then(|c| c[1].parse::<u64>().ok())?;

    // Entry lines start with an index number; the file name is the last
    // column.
    let mut files = Vec::new();
    for line in output.lines() {
        let mut cols = line.split_whitespace();
        let Some(first) = cols.next() else { continue };
        if !first.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Some(name) = cols.last() {
            if !name.ends_with(')') {
                files.push(name.to_string());
            }
        }
    }
    Some(DirectoryListing {
        file_system,
        total_free,
        files,
    })
}

/// Digest from `verify /md5` output. Only the explicit
/// `Verified (...) = <digest>` form counts; an absent or differently
/// shaped line yields `None`.
pub fn verified_digest(output: &str) -> Option<String> {
    let re = Regex::new(r"Verified\s+\([^)]*\)\s*=\s*([0-9A-Fa-f]+)").ok()?;
    re.captures(output).map(|c| c[1].to_string())
}

/// Non-empty `boot system` lines from `show run | i boot system` output.
pub fn boot_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// At most the last `n` characters of a blob, for journal dumps of large
/// outputs.
pub fn tail(output: &str, n: usize) -> &str {
    let len = output.chars().count();
    if len <= n {
        return output;
    }
    let skip = len - n;
    match output.char_indices().nth(skip) {
        Some((idx, _)) => &output[idx..],
        None => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_VERSION: &str = "\
Cisco IOS Software, C2960X Software (C2960X-UNIVERSALK9-M), Version 15.2(2)E6, RELEASE SOFTWARE (fc1)
...
cisco WS-C2960X-24TS-L (APM86XXX) processor (revision J0) with 524288K bytes of memory.
Switch Ports Model              SW Version            SW Image
------ ----- -----              ----------            ----------
*    1 26    WS-C2960X-24TS-L   15.2(2)E6             C2960X-UNIVERSALK9-M

Motherboard assembly number     : 73-15128-05
Motherboard serial number       : FOC19283XYZ
Model number                    : WS-C2960X-24TS-L
System serial number            : FOC1927S0RM
";

    const SHOW_VERSION_INVENTORY: &str = "\
Some text
1 WS-C2960X-24TS-L revision line (revision J0) with memory
Processor board ID FOC1927S0RM
";

    const DIR_ALL: &str = "\
Directory of flash:/

    2  -rwx    26248081   Mar 1 1993 00:03:21 +00:00  c2960x-universalk9-mz.152-2.E6.bin
    3  -rwx        1048   Mar 1 1993 00:01:12 +00:00  config.text
    4  drwx         512   Mar 1 1993 00:01:12 +00:00  dc_profile_dir

122185728 bytes total (91347968 bytes free)
";

    #[test]
    fn product_id_comes_from_revision_line() {
        assert_eq!(
            product_id(SHOW_VERSION_INVENTORY).as_deref(),
            Some("WS-C2960X-24TS-L")
        );
        assert_eq!(product_id("no inventory here"), None);
    }

    #[test]
    fn serial_number_comes_from_board_id_line() {
        assert_eq!(
            serial_number(SHOW_VERSION_INVENTORY).as_deref(),
            Some("FOC1927S0RM")
        );
        assert_eq!(serial_number("nothing"), None);
    }

    #[test]
    fn os_version_strips_trailing_comma() {
        assert_eq!(os_version(SHOW_VERSION).as_deref(), Some("15.2(2)E6"));
        assert_eq!(os_version("garbage"), None);
    }

    #[test]
    fn directory_listing_extracts_fs_free_and_files() {
        let listing = directory_listing(DIR_ALL).unwrap();
        assert_eq!(listing.file_system, "flash:");
        assert_eq!(listing.total_free, 91_347_968);
        assert!(listing.contains("c2960x-universalk9-mz.152-2.E6.bin"));
        assert!(listing.contains("config.text"));
        assert!(!listing.contains("missing.bin"));
    }

    #[test]
    fn directory_listing_requires_header_and_free_summary() {
        assert!(directory_listing("not a listing").is_none());
        assert!(directory_listing("Directory of flash:/\nno summary").is_none());
    }

    #[test]
    fn verified_digest_requires_the_verified_marker() {
        let out = "\
.................Done!
Verified (flash:/image.bin) = 0123456789abcdef0123456789abcdef
";
        assert_eq!(
            verified_digest(out).as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
        // A computed digest without the marker does not verify.
        let unverified = "Computed signature = 0123456789abcdef0123456789abcdef";
        assert_eq!(verified_digest(unverified), None);
    }

    #[test]
    fn boot_lines_drops_blanks() {
        let out = "boot system flash:/old.bin\n\nboot system flash:/older.bin\n";
        assert_eq!(
            boot_lines(out),
            vec![
                "boot system flash:/old.bin".to_string(),
                "boot system flash:/older.bin".to_string(),
            ]
        );
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
    }
}

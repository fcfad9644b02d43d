use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Filesystem to lay down on a partition; `Raw` means no filesystem command
/// is emitted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Vfat,
    Ext4,
    Swap,
    Ntfs,
    Raw,
}

impl std::str::FromStr for Format {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vfat" => Ok(Format::Vfat),
            "ext4" => Ok(Format::Ext4),
            "swap" => Ok(Format::Swap),
            "ntfs" => Ok(Format::Ntfs),
            "raw" => Ok(Format::Raw),
            other => Err(PlanError::InvalidLayout(format!("unknown format '{other}'"))),
        }
    }
}

/// One partition in a layout, as parsed from the recipe's `partition_layout`
/// JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// `"512M"`, `"32G"`, or `"100%"`.
    pub size: String,
    /// A full 36-char GUID, or a known alias (`ef00`, `8200`, `8300`, `0700`, `0c01`).
    pub type_guid: String,
    pub format: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Either an absolute byte-ish size suffix (`sgdisk`'s `+<size>` form,
/// verbatim) or the special "consume the rest of the disk" marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeSpec {
    Suffixed(String),
    Rest,
}

/// Parses a layout `size` field. `sgdisk` accepts its own size suffixes
/// (`K`/`M`/`G`/`T`) verbatim, so this only needs to recognise `100%` as the
/// "rest of the disk" marker and otherwise pass the string through.
pub fn parse_size(size: &str) -> Result<SizeSpec, PlanError> {
    if size == "100%" {
        return Ok(SizeSpec::Rest);
    }
    let digits_end = size.find(|c: char| !c.is_ascii_digit()).unwrap_or(size.len());
    if digits_end == 0 {
        return Err(PlanError::InvalidLayout(format!("invalid size '{size}'")));
    }
    let suffix = &size[digits_end..];
    if !matches!(suffix, "K" | "M" | "G" | "T") {
        return Err(PlanError::InvalidLayout(format!("invalid size '{size}'")));
    }
    Ok(SizeSpec::Suffixed(size.to_string()))
}

/// Resolves a GUID alias or validates a full 36-char GUID literal.
pub fn resolve_type_guid(type_guid: &str) -> Result<String, PlanError> {
    let resolved = match type_guid {
        "ef00" => "C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
        "8200" => "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F",
        "8300" => "0FC63DAF-8483-4772-8E79-3D69D8477DE4",
        "0700" => "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7",
        "0c01" => "E3C9E316-0B5C-4DB8-817D-F92DF00215AE",
        other if other.len() == 36 && other.chars().filter(|c| *c == '-').count() == 4 => other,
        other => return Err(PlanError::InvalidLayout(format!("unknown type_guid alias '{other}'"))),
    };
    Ok(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_accepts_suffixed_and_percent() {
        assert_eq!(parse_size("512M").unwrap(), SizeSpec::Suffixed("512M".into()));
        assert_eq!(parse_size("100%").unwrap(), SizeSpec::Rest);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("512MB").is_err());
        assert!(parse_size("abc").is_err());
    }

    #[test]
    fn resolve_type_guid_known_aliases() {
        assert_eq!(resolve_type_guid("ef00").unwrap(), "C12A7328-F81F-11D2-BA4B-00A0C93EC93B");
        assert_eq!(resolve_type_guid("8300").unwrap(), "0FC63DAF-8483-4772-8E79-3D69D8477DE4");
    }

    #[test]
    fn resolve_type_guid_passes_through_full_guid() {
        let guid = "11111111-2222-3333-4444-555555555555";
        assert_eq!(resolve_type_guid(guid).unwrap(), guid);
    }

    #[test]
    fn resolve_type_guid_rejects_unknown_alias() {
        assert!(resolve_type_guid("zzzz").is_err());
    }
}

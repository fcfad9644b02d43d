use serde::Serialize;

use crate::error::PlanError;
use crate::layout::{parse_size, resolve_type_guid, Format, LayoutEntry, SizeSpec};

/// One emitted command: a program and its argument list, individually
/// renderable as a shell line by the CLI's `--output=shell` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    fn new(program: &str, args: Vec<String>) -> Self {
        Command { program: program.to_string(), args }
    }

    /// Renders as a single shell line, space-joined with no further quoting —
    /// every argument here is either a disk path, digits, a GUID, or a label
    /// that's already been through the recipe's env sanitisation.
    pub fn to_shell_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Partition device naming: `/dev/nvme0n1` -> `/dev/nvme0n1p1` (disk ends in
/// a digit, so the partition number needs a `p` separator); `/dev/sda` ->
/// `/dev/sda1`.
fn partition_device(disk: &str, index: usize) -> String {
    let ends_in_digit = disk.chars().last().is_some_and(|c| c.is_ascii_digit());
    if ends_in_digit {
        format!("{disk}p{index}")
    } else {
        format!("{disk}{index}")
    }
}

/// Plans the exact `sgdisk`/`mkfs.*` command sequence for `layout` applied to
/// `disk`. Pure and deterministic: the same input always produces
/// bit-identical output. Fails with `InvalidLayout` before emitting anything
/// if any entry has an unknown format or type_guid alias.
pub fn plan(disk: &str, layout: &[LayoutEntry]) -> Result<Vec<Command>, PlanError> {
    // Validate every entry up front so a bad entry never leaves a partial plan.
    let mut resolved = Vec::with_capacity(layout.len());
    for entry in layout {
        let size = parse_size(&entry.size)?;
        let guid = resolve_type_guid(&entry.type_guid)?;
        let format: Format = entry.format.parse()?;
        resolved.push((size, guid, format, entry.label.clone()));
    }

    let mut commands = Vec::new();
    commands.push(Command::new("sgdisk", vec!["--zap-all".into(), disk.to_string()]));
    commands.push(Command::new("sgdisk", vec!["-o".into(), disk.to_string()]));

    for (i, (size, guid, format, label)) in resolved.into_iter().enumerate() {
        let index = i + 1;
        let size_arg = match size {
            SizeSpec::Rest => format!("{index}:0:0"),
            SizeSpec::Suffixed(s) => format!("{index}:0:+{s}"),
        };
        commands.push(Command::new("sgdisk", vec!["-n".into(), size_arg, disk.to_string()]));
        commands.push(Command::new(
            "sgdisk",
            vec!["-t".into(), format!("{index}:{guid}"), disk.to_string()],
        ));
        if let Some(label) = &label {
            commands.push(Command::new(
                "sgdisk",
                vec!["-c".into(), format!("{index}:{label}"), disk.to_string()],
            ));
        }

        let part_dev = partition_device(disk, index);
        let label_arg = label.clone().unwrap_or_default();
        match format {
            Format::Vfat => commands.push(Command::new(
                "mkfs.vfat",
                vec!["-F".into(), "32".into(), "-n".into(), label_arg, part_dev],
            )),
            Format::Ext4 => commands.push(Command::new(
                "mkfs.ext4",
                vec!["-F".into(), "-L".into(), label_arg, part_dev],
            )),
            Format::Swap => commands.push(Command::new("mkswap", vec!["-L".into(), label_arg, part_dev])),
            Format::Ntfs => commands.push(Command::new(
                "mkfs.ntfs",
                vec!["-f".into(), "-F".into(), "-L".into(), label_arg, part_dev],
            )),
            Format::Raw => {}
        }
    }

    commands.push(Command::new("sgdisk", vec!["-p".into(), disk.to_string()]));
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: &str, type_guid: &str, format: &str, label: Option<&str>) -> LayoutEntry {
        LayoutEntry {
            size: size.into(),
            type_guid: type_guid.into(),
            format: format.into(),
            label: label.map(String::from),
        }
    }

    #[test]
    fn linux_layout_scenario() {
        let layout = vec![
            entry("512M", "ef00", "vfat", Some("ESP")),
            entry("100%", "8300", "ext4", Some("root")),
        ];
        let commands = plan("/dev/nvme0n1", &layout).unwrap();

        assert_eq!(commands[0].to_shell_line(), "sgdisk --zap-all /dev/nvme0n1");
        assert_eq!(commands[1].to_shell_line(), "sgdisk -o /dev/nvme0n1");
        assert_eq!(commands[2].to_shell_line(), "sgdisk -n 1:0:+512M /dev/nvme0n1");
        assert_eq!(
            commands[3].to_shell_line(),
            "sgdisk -t 1:C12A7328-F81F-11D2-BA4B-00A0C93EC93B /dev/nvme0n1"
        );
        assert_eq!(commands[4].to_shell_line(), "sgdisk -c 1:ESP /dev/nvme0n1");
        assert_eq!(commands[5].to_shell_line(), "mkfs.vfat -F 32 -n ESP /dev/nvme0n1p1");
        assert_eq!(commands[6].to_shell_line(), "sgdisk -n 2:0:0 /dev/nvme0n1");
        assert_eq!(commands.last().unwrap().to_shell_line(), "sgdisk -p /dev/nvme0n1");
    }

    #[test]
    fn windows_layout_scenario() {
        let layout = vec![
            entry("100M", "0c01", "raw", None),
            entry("260M", "ef00", "vfat", Some("SYSTEM")),
            entry("100%", "0700", "ntfs", Some("WINDOWS")),
        ];
        let commands = plan("/dev/sda", &layout).unwrap();

        // The MSR partition is raw, so no filesystem command follows its sgdisk lines.
        assert!(commands.iter().any(|c| c.program == "sgdisk" && c.args.contains(&"1:0:+100M".to_string())));
        assert!(!commands.iter().any(|c| c.program == "mkfs.raw"));
        assert!(commands.iter().any(|c| c.to_shell_line() == "mkfs.ntfs -f -F -L WINDOWS /dev/sda3"));
    }

    #[test]
    fn unknown_format_fails_before_any_command_is_emitted() {
        let layout = vec![entry("100%", "8300", "zfs", None)];
        assert!(plan("/dev/sda", &layout).is_err());
    }

    #[test]
    fn unknown_alias_fails_before_any_command_is_emitted() {
        let layout = vec![entry("100%", "zzzz", "ext4", None)];
        assert!(plan("/dev/sda", &layout).is_err());
    }

    #[test]
    fn plan_is_deterministic() {
        let layout = vec![entry("512M", "ef00", "vfat", Some("ESP"))];
        let a = plan("/dev/sda", &layout).unwrap();
        let b = plan("/dev/sda", &layout).unwrap();
        assert_eq!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn plan_is_deterministic_across_arbitrary_valid_layouts(
            pct in 1u32..99,
            label in "[a-zA-Z]{1,8}",
        ) {
            let layout = vec![entry(&format!("{pct}M"), "8300", "ext4", Some(&label))];
            let a = plan("/dev/sda", &layout).unwrap();
            let b = plan("/dev/sda", &layout).unwrap();
            proptest::prop_assert_eq!(a, b);
        }
    }
}

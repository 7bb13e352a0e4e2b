//! Mount table line parser for Linux systems.
//!
//! Parses lines in `/proc/mounts` (fstab / mntent) format. See
//! [`proc_mounts(5)`](https://man7.org/linux/man-pages/man5/proc_mounts.5.html)
//! and [`fstab(5)`](https://man7.org/linux/man-pages/man5/fstab.5.html)
//! for details on the structure.

use std::borrow::Cow;

/// Represents a parsed mount table line.
#[derive(Debug, PartialEq, Eq)]
pub struct MountEntry<'a> {
    /// Directory the filesystem is mounted on.
    pub mount_point: Cow<'a, str>,
    /// Filesystem type (e.g., `ext4`, `cgroup`, `cgroup2`).
    pub fs_type: &'a str,
    /// Comma-separated mount options.
    pub options: &'a str,
}

impl MountEntry<'_> {
    /// Returns true if `option` appears as one of the comma-separated mount options.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.split(',').any(|opt| opt == option)
    }
}

/// Named fields in a mount table line.
#[derive(Debug)]
pub enum MountField {
    Source,
    MountPoint,
    FsType,
    Options,
    DumpFreq,
    PassNo,
}

impl std::fmt::Display for MountField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MountField::Source => "source",
            MountField::MountPoint => "mount_point",
            MountField::FsType => "fs_type",
            MountField::Options => "options",
            MountField::DumpFreq => "dump_freq",
            MountField::PassNo => "pass_no",
        };
        write!(f, "{name}")
    }
}

/// Errors that may occur when parsing a mount table line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing `{field}` in line: `{line}`")]
    MissingField { field: MountField, line: String },

    #[error("invalid `{field}` value `{value}` in line: `{line}`")]
    InvalidNumber {
        field: MountField,
        value: String,
        line: String,
    },
}

/// Returns true for lines `getmntent(3)` skips: blank lines and `#` comments.
pub fn is_ignorable_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parses a single line of mount table data.
///
/// Octal escapes produced by the kernel for whitespace and backslashes
/// (`\040`, `\011`, `\012`, `\134`) are decoded in the mount point. The
/// source field is only checked for presence. The trailing dump and pass
/// fields are optional and validated but not kept.
///
/// # Errors
///
/// Returns [`ParseError::MissingField`] if one of the four mandatory fields
/// is absent and [`ParseError::InvalidNumber`] if a trailing numeric field
/// is malformed.
pub fn parse_mount_line(line: &str) -> Result<MountEntry<'_>, ParseError> {
    let mut fields = line.split_whitespace();
    let mut next_field = |field: MountField| {
        fields.next().ok_or_else(|| ParseError::MissingField {
            field,
            line: line.to_owned(),
        })
    };

    next_field(MountField::Source)?;
    let mount_point = next_field(MountField::MountPoint)?;
    let fs_type = next_field(MountField::FsType)?;
    let options = next_field(MountField::Options)?;

    check_optional_number(fields.next(), MountField::DumpFreq, line)?;
    check_optional_number(fields.next(), MountField::PassNo, line)?;

    Ok(MountEntry {
        mount_point: unescape(mount_point),
        fs_type,
        options,
    })
}

fn check_optional_number(
    value: Option<&str>,
    field: MountField,
    line: &str,
) -> Result<(), ParseError> {
    match value {
        None => Ok(()),
        Some(value) => value
            .parse::<u32>()
            .map(drop)
            .map_err(|_| ParseError::InvalidNumber {
                field,
                value: value.to_owned(),
                line: line.to_owned(),
            }),
    }
}

/// Decodes `\ooo` octal escapes. Borrows the input when nothing is escaped.
fn unescape(field: &str) -> Cow<'_, str> {
    if !field.contains('\\') {
        return Cow::Borrowed(field);
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    Cow::Owned(String::from_utf8_lossy(&out).into_owned())
}

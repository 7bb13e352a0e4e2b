//! Parsing of `/proc/<pid>/cgroup` membership files.
//!
//! File format: `<hierarchy-id>:<controller-list>:<cgroup-path>`
//!
//! - `<hierarchy-id>`: v1 an arbitrary number, v2 always `0`
//! - `<controller-list>`: v1 comma-separated controllers (e.g. `cpu,cpuacct`
//!   or `name=systemd`), v2 always empty
//! - `<cgroup-path>`: path of the process's cgroup relative to the mount
//!   point of that hierarchy
//!
//! See [`cgroups(7)`](https://man7.org/linux/man-pages/man7/cgroups.7.html).

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil;

/// One line of a `/proc/<pid>/cgroup` file.
#[derive(Debug, PartialEq, Eq)]
pub struct ProcCgroupEntry<'a> {
    pub hierarchy_id: &'a str,
    /// Controller list; empty for the v2 unified hierarchy.
    pub controllers: &'a str,
    /// Path relative to the hierarchy's mount point, e.g. `/user.slice`.
    pub path: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read line for file `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed line {line} in file `{path}`: `{content}`")]
    Malformed {
        path: PathBuf,
        line: usize,
        content: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parses a single membership line. Returns `None` if the line has fewer
/// than three `:`-separated fields.
///
/// The path field may itself contain `:`, only the first two separators count.
pub fn parse_proc_cgroup_line(line: &str) -> Option<ProcCgroupEntry<'_>> {
    let mut parts = line.trim_end_matches('\n').splitn(3, ':');
    Some(ProcCgroupEntry {
        hierarchy_id: parts.next()?,
        controllers: parts.next()?,
        path: parts.next()?,
    })
}

/// Visits every entry of a `/proc/<pid>/cgroup` file.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::ReadLine`] if reading fails.
/// - [`Error::Malformed`] if a non-empty line can't be parsed.
pub fn visit_proc_cgroup<F>(path: impl AsRef<Path>, visit: F) -> Result<()>
where
    F: FnMut(&ProcCgroupEntry<'_>),
{
    let path = path.as_ref();
    let reader = fsutil::open_file_reader(path)?;
    visit_proc_cgroup_from_reader(reader, path, visit)
}

fn visit_proc_cgroup_from_reader<R, F>(mut reader: R, origin: &Path, mut visit: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(&ProcCgroupEntry<'_>),
{
    let mut line = String::with_capacity(128);
    let mut lineno = 0;

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        lineno += 1;
        if !line.trim().is_empty() {
            let entry = parse_proc_cgroup_line(&line).ok_or_else(|| Error::Malformed {
                path: origin.to_path_buf(),
                line: lineno,
                content: line.trim_end().to_owned(),
            })?;
            visit(&entry);
        }
        line.clear();
    }

    Ok(())
}

/// Joins the caller's own cgroup path with a requested sub path.
///
/// ```
/// use cgroup_limits::placement::concat_placement;
///
/// assert_eq!(concat_placement("/", ""), "/");
/// assert_eq!(concat_placement("/", "foo"), "/foo");
/// assert_eq!(concat_placement("/user.slice", ""), "/user.slice");
/// assert_eq!(concat_placement("/user.slice", "foo"), "/user.slice/foo");
/// ```
pub fn concat_placement(self_path: &str, path: &str) -> String {
    let separator = if self_path == "/" || path.is_empty() {
        ""
    } else {
        "/"
    };
    format!("{self_path}{separator}{path}")
}

/// Returns true if a placement designates the root of a hierarchy.
pub fn is_root_placement(placement: &str) -> bool {
    placement.is_empty() || placement == "/"
}

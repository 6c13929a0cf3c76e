//! Project tree filtering rules
//!
//! Implements the filter-correctness contract from the Sync Engine spec:
//! extension matching, segment-wise path containment, and the
//! ignored/included interaction that lets an `included_paths` entry punch a
//! hole through an ignored ancestor directory.

/// Normalize a path into lowercase, `/`-separated segments, dropping empty
/// and `.` components. This is the basis for segment-wise prefix
/// comparisons — a substring match would wrongly treat `nodefoo` as inside
/// `node`.
fn segments(path: &str) -> Vec<String> {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| s.to_lowercase())
        .collect()
}

/// `true` if `parent`'s segments form a prefix of `child`'s segments
/// (segment-wise, not substring). Equal paths count as a prefix of
/// themselves.
fn is_prefix(parent: &[String], child: &[String]) -> bool {
    parent.len() <= child.len() && parent.iter().zip(child.iter()).all(|(p, c)| p == c)
}

#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    /// Extensions without a leading dot, lowercase. Empty means "accept all".
    allowed_extensions: Vec<String>,
    ignored: Vec<Vec<String>>,
    included: Vec<Vec<String>>,
}

impl PathFilter {
    pub fn new<E, I, C>(allowed_extensions: E, ignored_paths: I, included_paths: C) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            ignored: ignored_paths.into_iter().map(|p| segments(p.as_ref())).collect(),
            included: included_paths.into_iter().map(|p| segments(p.as_ref())).collect(),
        }
    }

    fn is_ignored(&self, path_segs: &[String]) -> bool {
        self.ignored.iter().any(|ig| is_prefix(ig, path_segs))
    }

    fn is_inside_included(&self, path_segs: &[String]) -> bool {
        self.included.iter().any(|inc| is_prefix(inc, path_segs))
    }

    /// `true` if `path_segs` must be walked through to reach some included
    /// path beneath it (i.e. `path_segs` is an ancestor of, or equal to, an
    /// included entry).
    fn is_bridge_to_included(&self, path_segs: &[String]) -> bool {
        self.included.iter().any(|inc| is_prefix(path_segs, inc))
    }

    fn extension_matches(&self, relative_path: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        match relative_path.rsplit_once('.') {
            Some((_, ext)) => self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    /// Whether a directory should be entered during the tree walk.
    pub fn enters_dir(&self, relative_path: &str) -> bool {
        let segs = segments(relative_path);
        if segs.is_empty() {
            return true;
        }
        !self.is_ignored(&segs) || self.is_bridge_to_included(&segs) || self.is_inside_included(&segs)
    }

    /// Whether a file should be collected for indexing.
    pub fn collects_file(&self, relative_path: &str) -> bool {
        let segs = segments(relative_path);
        let ignore_ok = !self.is_ignored(&segs) || self.is_inside_included(&segs);
        ignore_ok && self.extension_matches(relative_path)
    }
}

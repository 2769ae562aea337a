//! Virtual paths and the bidirectional mapping to filesystem directories.
//!
//! A virtual path (VP) is a UNIX-like slash-delimited document identifier,
//! e.g. `/a/b`. The mapper injects an intermediate `children/` segment
//! between every path component so each directory has room for both
//! segment files and a `children/` subdirectory, enabling recursive
//! enumeration without naming collisions between a segment filename and a
//! child directory name.

use std::fmt;
use std::path::{Path, PathBuf};

/// A virtual document path, e.g. `/a/b`.
///
/// Always normalized: a single leading slash, no trailing slash (except
/// for the root path `/` itself), no empty components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vp(String);

impl Vp {
    /// Construct a VP from a slash-delimited string, normalizing it.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        let components = Self::split(raw.as_ref());
        if components.is_empty() {
            Self("/".to_string())
        } else {
            Self(format!("/{}", components.join("/")))
        }
    }

    /// The root VP, `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Components of this VP, in order, excluding the leading slash.
    #[must_use]
    pub fn components(&self) -> Vec<&str> {
        Self::split(&self.0)
    }

    /// The raw string form, e.g. `/a/b`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(raw: &str) -> Vec<&str> {
        raw.split('/').filter(|s| !s.is_empty()).collect()
    }
}

impl fmt::Display for Vp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Vp {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Vp {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// Maps virtual paths to filesystem directories, and back.
///
/// Layout under `root`:
/// ```text
/// root/
///   paths/                     VP "/" maps here
///   paths/children/<seg>/      recursion for "/seg"
///   paths/children/<seg>/children/<seg2>/   recursion for "/seg/seg2"
/// ```
#[derive(Debug, Clone)]
pub struct PathMapper {
    root: PathBuf,
}

impl PathMapper {
    /// Create a mapper rooted at `root`. Does not touch the filesystem.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The filesystem directory under which segment/pending files for
    /// `vp` live.
    #[must_use]
    pub fn dir_for(&self, vp: &Vp) -> PathBuf {
        let mut path = self.root.join("paths");
        for component in vp.components() {
            path = path.join("children").join(component);
        }
        path
    }

    /// The `meta/` directory (sequencer state), fixed regardless of VP.
    #[must_use]
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    /// Reverse mapping: given a directory under `root/paths`, recover the
    /// VP it corresponds to. Returns `None` if `dir` is not a valid
    /// mapped directory (e.g. it isn't rooted under `paths/`, or a
    /// component isn't preceded by `children`).
    #[must_use]
    pub fn path_for_dir(&self, dir: &Path) -> Option<Vp> {
        let paths_root = self.root.join("paths");
        let relative = dir.strip_prefix(&paths_root).ok()?;
        let mut components = Vec::new();
        let mut iter = relative.components().peekable();
        while let Some(component) = iter.next() {
            let name = component.as_os_str().to_str()?;
            if name != "children" {
                return None;
            }
            let segment = iter.next()?.as_os_str().to_str()?;
            components.push(segment.to_string());
        }
        if components.is_empty() {
            Some(Vp::root())
        } else {
            Some(Vp::new(format!("/{}", components.join("/"))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vp_normalizes_trailing_and_leading_slashes() {
        assert_eq!(Vp::new("/a/b").as_str(), "/a/b");
        assert_eq!(Vp::new("a/b").as_str(), "/a/b");
        assert_eq!(Vp::new("/a/b/").as_str(), "/a/b");
        assert_eq!(Vp::new("//a//b//").as_str(), "/a/b");
        assert_eq!(Vp::new("").as_str(), "/");
        assert_eq!(Vp::new("/").as_str(), "/");
    }

    #[test]
    fn dir_for_injects_children_between_components() {
        let mapper = PathMapper::new("/root");
        assert_eq!(mapper.dir_for(&Vp::root()), PathBuf::from("/root/paths"));
        assert_eq!(
            mapper.dir_for(&Vp::new("/a")),
            PathBuf::from("/root/paths/children/a")
        );
        assert_eq!(
            mapper.dir_for(&Vp::new("/a/b")),
            PathBuf::from("/root/paths/children/a/children/b")
        );
    }

    #[test]
    fn path_for_dir_is_the_inverse_of_dir_for() {
        let mapper = PathMapper::new("/root");
        for vp in [Vp::root(), Vp::new("/a"), Vp::new("/a/b"), Vp::new("/a/b/c")] {
            let dir = mapper.dir_for(&vp);
            assert_eq!(mapper.path_for_dir(&dir), Some(vp));
        }
    }

    #[test]
    fn path_for_dir_rejects_malformed_directories() {
        let mapper = PathMapper::new("/root");
        assert_eq!(mapper.path_for_dir(Path::new("/elsewhere")), None);
        assert_eq!(
            mapper.path_for_dir(Path::new("/root/paths/notchildren/a")),
            None
        );
    }
}

//! Path resolution.
//!
//! Paths are POSIX absolute: split on '/', empty components dropped (so a
//! trailing slash changes nothing), walked from the root directory down.
//! Paths deeper than MAX_DEPTH are a caller bug, not an I/O error.

use arrayvec::ArrayVec;

use super::{Inode, Vdfs};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::param::{MAX_DEPTH, ROOT_INO};

pub(crate) type Components<'a> = ArrayVec<&'a str, MAX_DEPTH>;

/// Split `path` into its non-empty components.
pub(crate) fn components(path: &str) -> Components<'_> {
    let mut parts = Components::new();
    for c in path.split('/').filter(|c| !c.is_empty()) {
        assert!(parts.len() < MAX_DEPTH, "path too deep: {}", path);
        parts.push(c);
    }
    parts
}

/// Split `path` into (parent path, final name). None when it names the root.
pub(crate) fn split_parent(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some(("/", &trimmed[1..])),
        Some(i) => Some((&trimmed[..i], &trimmed[i + 1..])),
        None => Some(("/", trimmed)),
    }
}

impl<D: BlockDevice> Vdfs<D> {
    /// Walk `path` from the root, returning the terminal inode slot and a
    /// copy of its record.
    pub(crate) fn resolve(&mut self, path: &str) -> Result<(u32, Inode)> {
        let mut pos = ROOT_INO;
        let mut ino = self.read_inode(pos)?;
        for name in components(path) {
            if !ino.is_dir() {
                return Err(Error::NotDirectory);
            }
            pos = self.find_entry(&ino, name)?.ok_or(Error::NotFound)?;
            ino = self.read_inode(pos)?;
        }
        Ok((pos, ino))
    }

    /// Resolve the directory that holds `path`'s final component. Errors with
    /// `Exists` for the root itself, which has no parent.
    pub(crate) fn resolve_parent<'p>(&mut self, path: &'p str) -> Result<(u32, Inode, &'p str)> {
        let (parent, name) = split_parent(path).ok_or(Error::Exists)?;
        let (pos, ino) = self.resolve(parent)?;
        if !ino.is_dir() {
            return Err(Error::NotDirectory);
        }
        Ok((pos, ino, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_drop_empty_parts() {
        assert!(components("/").is_empty());
        assert!(components("///").is_empty());
        let parts = components("/a//b/c/");
        assert_eq!(parts.as_slice(), ["a", "b", "c"]);
    }

    #[test]
    fn split_parent_cases() {
        assert_eq!(split_parent("/"), None);
        assert_eq!(split_parent("//"), None);
        assert_eq!(split_parent("/a"), Some(("/", "a")));
        assert_eq!(split_parent("/a/"), Some(("/", "a")));
        assert_eq!(split_parent("/a/b/c"), Some(("/a/b", "c")));
        assert_eq!(split_parent("/a/b/"), Some(("/a", "b")));
    }

    #[test]
    #[should_panic(expected = "path too deep")]
    fn overlong_paths_panic() {
        let deep = "/x".repeat(MAX_DEPTH + 1);
        components(&deep);
    }
}

//! Lexical confinement of task paths to permitted repository roots.

use std::fmt;
use std::path::{Component, Path};

/// Why a path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRejection {
    Empty,
    Absolute,
    Traversal,
    OutsideRoots,
}

impl fmt::Display for PathRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PathRejection::Empty => "empty",
            PathRejection::Absolute => "absolute",
            PathRejection::Traversal => "traversal",
            PathRejection::OutsideRoots => "outside_roots",
        };
        f.write_str(label)
    }
}

/// Check that `raw` is repository-relative and lies under one of `roots`.
///
/// Roots may span several segments (`src/app`); a path matches when its
/// leading components equal the root's. Purely lexical: nothing touches the
/// filesystem, so symlinks are not followed here. The executor resolves
/// declared outputs against the real root before reading them. Backslashes
/// are treated as separators so Windows-style paths cannot slip past the
/// component checks.
pub fn confine(raw: &str, roots: &[String]) -> Result<(), PathRejection> {
    let unified = raw.trim().replace('\\', "/");
    if unified.is_empty() {
        return Err(PathRejection::Empty);
    }
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(PathRejection::Absolute);
    }

    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::ParentDir => return Err(PathRejection::Traversal),
            Component::RootDir | Component::Prefix(_) => return Err(PathRejection::Absolute),
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    if parts.is_empty() {
        return Err(PathRejection::Empty);
    }

    if roots.iter().any(|root| {
        let root_parts = root_segments(root);
        !root_parts.is_empty()
            && root_parts.len() <= parts.len()
            && root_parts.iter().zip(&parts).all(|(want, got)| *want == got.as_str())
    }) {
        Ok(())
    } else {
        Err(PathRejection::OutsideRoots)
    }
}

fn root_segments(root: &str) -> Vec<&str> {
    root.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> Vec<String> {
        vec!["src".to_string(), "tests/".to_string()]
    }

    #[test]
    fn accepts_paths_under_roots() {
        assert_eq!(confine("src/lib.rs", &roots()), Ok(()));
        assert_eq!(confine("./tests/a/b.txt", &roots()), Ok(()));
        assert_eq!(confine("src", &roots()), Ok(()));
    }

    #[test]
    fn rejects_escapes() {
        assert_eq!(confine("/etc/passwd", &roots()), Err(PathRejection::Absolute));
        assert_eq!(confine("C:\\Windows", &roots()), Err(PathRejection::Absolute));
        assert_eq!(
            confine("src/../../secret", &roots()),
            Err(PathRejection::Traversal)
        );
        assert_eq!(
            confine("src\\..\\x", &roots()),
            Err(PathRejection::Traversal)
        );
        assert_eq!(confine("docs/a.md", &roots()), Err(PathRejection::OutsideRoots));
        assert_eq!(confine("  ", &roots()), Err(PathRejection::Empty));
        assert_eq!(confine("./", &roots()), Err(PathRejection::Empty));
    }

    #[test]
    fn multi_segment_roots_match_leading_components() {
        let roots = vec!["src/app".to_string(), "./docs/".to_string()];
        assert_eq!(confine("src/app/main.rs", &roots), Ok(()));
        assert_eq!(confine("src/app", &roots), Ok(()));
        assert_eq!(confine("docs/guide.md", &roots), Ok(()));
        assert_eq!(confine("src/other.rs", &roots), Err(PathRejection::OutsideRoots));
        assert_eq!(confine("src/application/x", &roots), Err(PathRejection::OutsideRoots));
        assert_eq!(confine("src", &roots), Err(PathRejection::OutsideRoots));
    }
}

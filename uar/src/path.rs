//! Path canonicalization for archive members.
//!
//! Archive member names are stored and interpreted independently of the
//! host filesystem's actual root; this module normalizes a path the caller
//! hands us (when building an archive) or a path we read back out of an
//! archive's index (when extracting) to the canonical form the format
//! requires: absolute, `/`-separated, free of `.`/`..` components.

use std::path::{Component, Path, PathBuf};

use crate::Error;

/// POSIX `PATH_MAX`, the bound the original C implementation resolves via
/// `<linux/limits.h>` / `<sys/syslimits.h>`.
pub const PATH_MAX: usize = 4096;

/// Outcome of [`normalize`]: the canonical path, plus whether a leading
/// `./` or `../` component had to be stripped to get there.
pub struct Normalized {
    pub path: String,
    /// Set when a leading `./` or `../` was silently/loudly dropped.
    pub warning: Option<String>,
}

/// Normalize a path into the canonical form stored in an archive entry.
///
/// - A leading `./` is stripped silently.
/// - A leading `../` is stripped, but reported back via
///   [`Normalized::warning`] so the caller can route it through a
///   [`crate::diagnostics::Diagnostic`].
/// - The result is always absolute and always shorter than [`PATH_MAX`].
pub fn normalize(input: &str) -> Result<Normalized, Error> {
    if input.len() > PATH_MAX {
        return Err(Error::InvalidPath(input.to_string()));
    }

    let mut warning = None;
    let mut rest = input;
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
            continue;
        }
        if let Some(stripped) = rest.strip_prefix("../") {
            warning = Some(format!("leading '../' stripped from {input:?}"));
            rest = stripped;
            continue;
        }
        break;
    }

    let mut components = Vec::new();
    for component in Path::new(rest).components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| Error::InvalidPath(input.to_string()))?;
                components.push(part.to_string());
            }
            Component::RootDir => {}
            Component::CurDir => {}
            Component::ParentDir => return Err(Error::InvalidPath(input.to_string())),
            Component::Prefix(_) => return Err(Error::InvalidPath(input.to_string())),
        }
    }

    let mut canonical = String::from("/");
    canonical.push_str(&components.join("/"));
    if canonical.len() > PATH_MAX {
        return Err(Error::InvalidPath(input.to_string()));
    }

    Ok(Normalized {
        path: canonical,
        warning,
    })
}

/// Join a directory entry's name onto its parent's already-canonical path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// True if `candidate`, once joined onto `root` and lexically resolved,
/// stays within `root`.
///
/// This is the mechanism behind the extractor's containment guarantee: no
/// archive entry, however its name is crafted, is allowed to escape the
/// destination directory. Mirrors the canonicalize-then-`starts_with`
/// pattern `tar`-style extractors use to guard against path traversal
/// (CVE-2001-1267 and its descendants).
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    let mut resolved = PathBuf::from(root);
    for component in candidate.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return false;
                }
            }
            Component::Prefix(_) => return false,
        }
    }
    resolved.starts_with(root)
}

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Check one descriptor path component: it must name exactly one normal
/// path segment, so descriptors received from peers can't point outside the
/// content directory.
pub fn validate_component(comp: &str) -> Result<(), &'static str> {
    if comp.is_empty() {
        return Err("empty path component");
    }
    if comp.contains('/') || comp.contains('\\') || comp.contains('\0') {
        return Err("separator in path component");
    }
    let mut parts = Path::new(comp).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), None) => Err("parent traversal not allowed"),
        (Some(Component::CurDir), None) => Err("current-dir component not allowed"),
        _ => Err("not a plain file name"),
    }
}

/// Join descriptor path components onto `base`, rejecting anything that could
/// escape it.
pub fn resolve(base: &Path, components: &[String]) -> Result<PathBuf> {
    let mut out = base.to_path_buf();
    for comp in components {
        if let Err(reason) = validate_component(comp) {
            return Err(Error::UnsafePath { path: base.join(components.join("/")), reason });
        }
        out.push(comp);
    }
    Ok(out)
}

/// Content names become both a file name and a directory name under the root.
pub fn validate_name(name: &str) -> Result<()> {
    validate_component(name)
        .map_err(|reason| Error::UnsafePath { path: PathBuf::from(name), reason })
}

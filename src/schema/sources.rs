use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::ComposeError;

const SDL_EXTENSIONS: [&str; 2] = ["graphql", "gql"];

/// One independently authored SDL fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefSource {
    /// Where the fragment came from; used in diagnostics.
    pub name: String,
    pub sdl: String,
}

impl TypeDefSource {
    pub fn new(name: impl Into<String>, sdl: impl Into<String>) -> Self {
        Self { name: name.into(), sdl: sdl.into() }
    }
}

/// Collect every `*.graphql` / `*.gql` file below `dir`, ordered by relative path.
/// A missing directory yields no fragments.
pub fn load_type_defs(dir: &Path) -> Result<Vec<TypeDefSource>, ComposeError> {
    if !dir.exists() {
        warn!(target: "schema", dir = %dir.display(), "type definition directory not found; no fragments loaded");
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ComposeError::Io { path: dir.display().to_string(), message: e.to_string() })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_sdl = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SDL_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if !is_sdl {
            continue;
        }
        let sdl = std::fs::read_to_string(path)
            .map_err(|e| ComposeError::Io { path: path.display().to_string(), message: e.to_string() })?;
        let rel = path.strip_prefix(dir).unwrap_or(path);
        let name = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
        debug!(target: "schema", fragment = %name, "loaded type definitions");
        out.push(TypeDefSource { name, sdl });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_sdl_files_recursively_in_path_order() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("b.graphql"), "type B { x: Int }").unwrap();
        std::fs::write(tmp.path().join("a.gql"), "type A { x: Int }").unwrap();
        std::fs::write(tmp.path().join("nested").join("c.graphql"), "type C { x: Int }").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let srcs = load_type_defs(tmp.path()).unwrap();
        let names: Vec<_> = srcs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.gql", "b.graphql", "nested/c.graphql"]);
        assert_eq!(srcs[0].sdl, "type A { x: Int }");
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = tempdir().unwrap();
        let srcs = load_type_defs(&tmp.path().join("nope")).unwrap();
        assert!(srcs.is_empty());
    }
}

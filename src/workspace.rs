//! Filesystem stand-ins for the editor host: a project directory for `@`
//! lookups and an optional "active document" for code insertion.

use crate::context::FileLookup;
use crate::session::Editor;
use anyhow::{anyhow, bail, Context};
use glob::glob;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Upper bound on files offered to the surface.
const MAX_FILES: usize = 5000;

/// Directories never worth scanning.
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".venv", "bin", "obj"];

#[derive(Debug, Clone)]
pub struct WorkspaceFiles {
    root: PathBuf,
}

impl WorkspaceFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Top-level skipped directories are pruned before globbing; deeper
    /// ones are filtered out of the results.
    fn files(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "failed to read workspace");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if self.is_skipped(&path) {
                continue;
            }
            if path.is_file() {
                out.push(path);
            } else if path.is_dir() {
                out.extend(self.glob_under(&path));
            }
            if out.len() >= MAX_FILES {
                out.truncate(MAX_FILES);
                break;
            }
        }
        out.sort();
        out
    }

    fn glob_under(&self, dir: &Path) -> Vec<PathBuf> {
        let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.display().to_string()));
        let Ok(paths) = glob(&pattern) else {
            tracing::warn!(%pattern, "invalid workspace pattern");
            return Vec::new();
        };

        paths
            .flatten()
            .filter(|p| p.is_file() && !self.is_skipped(p))
            .take(MAX_FILES)
            .collect()
    }

    fn is_skipped(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                SKIP_DIRS.contains(&name.as_ref()) || (name.starts_with('.') && name.len() > 1)
            }
            _ => false,
        })
    }
}

impl FileLookup for WorkspaceFiles {
    fn lookup(&self, file_name: &str) -> Option<String> {
        self.lookup_all(&[file_name]).pop().flatten()
    }

    fn lookup_all(&self, file_names: &[&str]) -> Vec<Option<String>> {
        let files = self.files();
        file_names
            .iter()
            .map(|name| {
                let path = files
                    .iter()
                    .find(|p| p.file_name().is_some_and(|n| n == *name))?;
                match std::fs::read_to_string(path) {
                    Ok(content) => Some(content),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to read referenced file");
                        None
                    }
                }
            })
            .collect()
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Editing against plain files. The "cursor" is the end of the active file.
#[derive(Debug, Clone)]
pub struct WorkspaceEditor {
    root: PathBuf,
    active_file: Option<PathBuf>,
}

impl WorkspaceEditor {
    pub fn new(root: impl Into<PathBuf>, active_file: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            active_file,
        }
    }

    fn active(&self) -> anyhow::Result<&Path> {
        self.active_file
            .as_deref()
            .ok_or_else(|| anyhow!("no active document (start with --active-file)"))
    }

    fn append_to_active(&self, code: &str) -> anyhow::Result<()> {
        let path = self.active()?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open: {}", path.display()))?;
        file.write_all(code.as_bytes())
            .with_context(|| format!("failed to write: {}", path.display()))?;
        if !code.ends_with('\n') {
            file.write_all(b"\n").ok();
        }
        tracing::info!(path = %path.display(), bytes = code.len(), "inserted code");
        Ok(())
    }
}

impl Editor for WorkspaceEditor {
    fn selection(&self) -> Option<String> {
        None
    }

    fn insert(&self, code: &str) -> anyhow::Result<()> {
        self.append_to_active(code)
    }

    fn show_diff(&self, code: &str) -> anyhow::Result<()> {
        let active = self.active()?;
        let ext = active.extension().and_then(|e| e.to_str()).unwrap_or("txt");
        let suggestion = std::env::temp_dir().join(format!("local-chat-suggestion.{ext}"));
        std::fs::write(&suggestion, code)
            .with_context(|| format!("failed to write suggestion: {}", suggestion.display()))?;
        tracing::info!(
            current = %active.display(),
            suggestion = %suggestion.display(),
            "suggestion ready for review"
        );
        Ok(())
    }

    fn apply(&self, code: &str) -> anyhow::Result<()> {
        self.append_to_active(code)
    }

    fn create_file(&self, name: &str, code: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(name.trim());
        if rel.as_os_str().is_empty() {
            bail!("file name is empty");
        }
        if rel.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            bail!("file name must stay inside the workspace: {name}");
        }

        let path = self.root.join(rel);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
        }
        std::fs::write(&path, code).with_context(|| format!("failed to write: {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lookup_finds_nested_file_by_base_name() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/deep")).unwrap();
        fs::write(dir.path().join("src/deep/util.py"), "def f(): pass").unwrap();

        let files = WorkspaceFiles::new(dir.path());
        assert_eq!(files.lookup("util.py").as_deref(), Some("def f(): pass"));
        assert_eq!(files.lookup("missing.py"), None);
    }

    #[test]
    fn lookup_all_resolves_a_batch_in_order() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join("src/target")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub mod a;").unwrap();
        fs::write(dir.path().join("README.md"), "# demo").unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.path().join("src/target/gen.rs"), "y").unwrap();

        let files = WorkspaceFiles::new(dir.path());
        assert_eq!(
            files.lookup_all(&["README.md", "index.js", "lib.rs", "gen.rs"]),
            vec![Some("# demo".to_string()), None, Some("pub mod a;".to_string()), None]
        );
    }

    #[test]
    fn list_skips_build_and_hidden_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("target/debug/out.rs"), "").unwrap();
        fs::write(dir.path().join(".git/config"), "").unwrap();
        fs::write(dir.path().join("b.rs"), "").unwrap();
        fs::write(dir.path().join("a.rs"), "").unwrap();

        assert_eq!(WorkspaceFiles::new(dir.path()).list(), vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn create_file_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let editor = WorkspaceEditor::new(dir.path(), None);

        assert!(editor.create_file("../evil.txt", "x").is_err());
        assert!(editor.create_file("/etc/evil.txt", "x").is_err());
        assert!(editor.create_file("  ", "x").is_err());

        let path = editor.create_file("src/new.rs", "fn x() {}").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "fn x() {}");
    }

    #[test]
    fn insert_appends_to_active_file() {
        let dir = tempdir().unwrap();
        let active = dir.path().join("main.rs");
        fs::write(&active, "fn main() {}\n").unwrap();

        let editor = WorkspaceEditor::new(dir.path(), Some(active.clone()));
        editor.insert("fn helper() {}").unwrap();
        assert_eq!(fs::read_to_string(&active).unwrap(), "fn main() {}\nfn helper() {}\n");

        let detached = WorkspaceEditor::new(dir.path(), None);
        assert!(detached.insert("x").is_err());
    }
}

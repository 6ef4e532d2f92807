//! `@file` reference expansion.
//!
//! `fix @src/util.py please` becomes a preamble holding the content of
//! `util.py`, a `User Question:` marker and the untouched prompt. Lookup is
//! by base name only; the directory part of a reference is informational,
//! so two files sharing a name resolve to whichever the lookup finds first.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static FILE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([\w.\-\\/]+\.[a-zA-Z0-9]+)").expect("file reference pattern is valid")
});

/// Finds workspace files for `@` references and the file picker.
pub trait FileLookup: Send + Sync {
    /// Full content of the file called `file_name`, if one exists.
    fn lookup(&self, file_name: &str) -> Option<String>;

    /// Content for each name in `file_names`, in order. Implementations that
    /// scan storage should do so once for the whole batch.
    fn lookup_all(&self, file_names: &[&str]) -> Vec<Option<String>> {
        file_names.iter().map(|name| self.lookup(name)).collect()
    }

    /// Names offered to the surface for `@` completion.
    fn list(&self) -> Vec<String>;
}

/// Expand every `@<path>.<ext>` reference in `prompt`.
///
/// Unresolvable references are dropped silently. A prompt without any
/// reference is returned unchanged.
pub fn resolve(prompt: &str, files: &dyn FileLookup) -> String {
    let refs: Vec<&str> = FILE_REF
        .captures_iter(prompt)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    if refs.is_empty() {
        return prompt.to_string();
    }

    let names: Vec<&str> = refs.iter().map(|raw| base_name(raw).unwrap_or_default()).collect();
    let contents = files.lookup_all(&names);

    let mut out = String::from("Below are the referenced files for context:\n\n");
    for (raw, content) in refs.into_iter().zip(contents) {
        match content {
            Some(content) => {
                out.push_str(&format!("--- File: {raw} ---\n"));
                out.push_str(&content);
                out.push_str("\n------------------------\n\n");
            }
            None => tracing::warn!(reference = raw, "referenced file not found, skipping"),
        }
    }

    out.push_str("\nUser Question:\n");
    out.push_str(prompt);
    out.push('\n');
    out
}

/// Prefix the active editor selection as a fenced context block.
pub fn with_selection(selection: Option<&str>, prompt: String) -> String {
    match selection {
        Some(code) if !code.trim().is_empty() => {
            format!("Context Code:\n```\n{code}\n```\n\nQuestion: {prompt}")
        }
        _ => prompt,
    }
}

fn base_name(reference: &str) -> Option<&str> {
    // Accept both separators regardless of platform.
    let last = reference.rsplit(['/', '\\']).next()?;
    Path::new(last).file_name().and_then(|n| n.to_str())
}

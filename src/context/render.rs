use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::store::types::Item;

const HEADER_START: &str = "#MULTICAT_START";
const HEADER_END: &str = "#MULTICAT_END";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextFormat {
    /// Each item behind a fixed header block naming dir, file and span.
    Headers,
    /// Each item as a heading plus a fenced code block.
    Markdown,
}

impl FromStr for ContextFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "headers" | "concatenated-with-headers" | "multicat" => Ok(ContextFormat::Headers),
            "markdown" | "markdown-fenced" | "md" => Ok(ContextFormat::Markdown),
            other => bail!("unknown format `{}` (expected `headers` or `markdown`)", other),
        }
    }
}

impl fmt::Display for ContextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextFormat::Headers => write!(f, "headers"),
            ContextFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// One-line stand-in for content that could not be fetched.
pub fn error_marker(path: &str, reason: &str) -> String {
    let reason = reason.replace(|c: char| c == '\r' || c == '\n', " ");
    format!("[error: could not load {}: {}]", path, reason)
}

/// Join item blocks with one blank line between consecutive blocks.
pub fn render(resolved: &[(&Item, String)], format: ContextFormat) -> String {
    resolved
        .iter()
        .map(|(item, content)| match format {
            ContextFormat::Headers => render_headers(item, content),
            ContextFormat::Markdown => render_markdown(item, content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_headers(item: &Item, content: &str) -> String {
    let (dir, name) = split_path(item.path());
    let span = match item {
        Item::File { .. } => "full".to_string(),
        Item::Span { target, .. } => format!("lines={}:{}", target.lines.start, target.lines.end),
    };
    format!(
        "{}\n# dir: {}\n# file: {}\n# span: {}\n{}\n{}",
        HEADER_START, dir, name, span, HEADER_END, content
    )
}

fn render_markdown(item: &Item, content: &str) -> String {
    let heading = match item {
        Item::File { target, .. } => format!("### {}", target.path),
        Item::Span { target, .. } => format!(
            "### {} (lines {}-{})",
            target.path, target.lines.start, target.lines.end
        ),
    };
    let fence = fence_for(content);
    let newline = if content.ends_with('\n') { "" } else { "\n" };
    format!(
        "{}\n{}{}\n{}{}{}",
        heading,
        fence,
        language_for(item.path()),
        content,
        newline,
        fence
    )
}

/// At least three backticks, and longer than any run inside the content.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for ch in content.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, name)) if !dir.is_empty() => (dir, name),
        Some((_, name)) => (".", name),
        None => (".", path),
    }
}

/// Fence language for a path, from its extension.
pub fn language_for(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return "text";
    };
    if stem.is_empty() || ext.is_empty() {
        return "text";
    }
    match ext.to_ascii_lowercase().as_str() {
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "mts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "rs" => "rust",
        "py" => "python",
        "go" => "go",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "sh" | "bash" => "bash",
        "md" => "markdown",
        "json" => "json",
        "toml" => "toml",
        "yml" | "yaml" => "yaml",
        "html" | "htm" => "html",
        "css" => "css",
        "sql" => "sql",
        _ => ext,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::LineRange;

    #[test]
    fn test_headers_block_for_file_and_span() {
        let file = Item::file("src", "src/a.js");
        let span = Item::span("src", "src/a.js", LineRange { start: 1, end: 1 }, "const x=1;");
        let out = render(
            &[(&file, "const x=1;".to_string()), (&span, "const x=1;".to_string())],
            ContextFormat::Headers,
        );
        assert_eq!(
            out,
            "#MULTICAT_START\n# dir: src\n# file: a.js\n# span: full\n#MULTICAT_END\nconst x=1;\
             \n\n\
             #MULTICAT_START\n# dir: src\n# file: a.js\n# span: lines=1:1\n#MULTICAT_END\nconst x=1;"
        );
    }

    #[test]
    fn test_headers_root_level_file() {
        let file = Item::file("src", "README");
        let out = render(&[(&file, "hi".to_string())], ContextFormat::Headers);
        assert!(out.contains("# dir: .\n# file: README\n"));
    }

    #[test]
    fn test_markdown_blocks() {
        let file = Item::file("src", "lib/util.rs");
        let span = Item::span("src", "Makefile", LineRange { start: 2, end: 4 }, "all:\n\tcc\n");
        let out = render(
            &[(&file, "fn a() {}".to_string()), (&span, "all:\n\tcc\n".to_string())],
            ContextFormat::Markdown,
        );
        assert_eq!(
            out,
            "### lib/util.rs\n```rust\nfn a() {}\n```\n\n### Makefile (lines 2-4)\n```text\nall:\n\tcc\n```"
        );
    }

    #[test]
    fn test_markdown_fence_outgrows_content() {
        let file = Item::file("docs", "guide.md");
        let out = render(&[(&file, "```sh\nls\n```".to_string())], ContextFormat::Markdown);
        assert!(out.starts_with("### guide.md\n````markdown\n```sh\nls\n```\n````"));
    }

    #[test]
    fn test_language_for() {
        assert_eq!(language_for("src/a.js"), "javascript");
        assert_eq!(language_for("a.RS"), "rust");
        assert_eq!(language_for("Makefile"), "text");
        assert_eq!(language_for(".gitignore"), "text");
        assert_eq!(language_for("data.proto"), "proto");
        assert_eq!(language_for("dir.v2/notes"), "text");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("md".parse::<ContextFormat>().unwrap(), ContextFormat::Markdown);
        assert_eq!(
            "concatenated-with-headers".parse::<ContextFormat>().unwrap(),
            ContextFormat::Headers
        );
        assert!("xml".parse::<ContextFormat>().is_err());
    }

    #[test]
    fn test_error_marker_is_one_line() {
        let marker = error_marker("src/a.js", "not found\nat line 2");
        assert_eq!(marker, "[error: could not load src/a.js: not found at line 2]");
    }
}

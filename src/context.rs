use crate::catalog::FileRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Encoding of the assembled context document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Xml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Xml => "xml",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "MARKDOWN",
            OutputFormat::Json => "JSON",
            OutputFormat::Xml => "XML",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            OutputFormat::Markdown => OutputFormat::Json,
            OutputFormat::Json => OutputFormat::Xml,
            OutputFormat::Xml => OutputFormat::Markdown,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonDocument<'a> {
    project_name: &'a str,
    files: Vec<&'a FileRecord>,
    timestamp: String,
}

/// Project the selected text records into one document.
///
/// Records are emitted in the order given (catalog order). Only the json
/// variant carries a timestamp; markdown and xml are byte-identical across
/// calls for the same input.
pub fn serialize<'a, I>(project: &str, records: I, format: OutputFormat) -> String
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let selected: Vec<&FileRecord> = records
        .into_iter()
        .filter(|r| r.is_text() && r.selected)
        .collect();

    match format {
        OutputFormat::Markdown => to_markdown(project, &selected),
        OutputFormat::Json => to_json(project, selected),
        OutputFormat::Xml => to_xml(project, &selected),
    }
}

fn to_markdown(project: &str, files: &[&FileRecord]) -> String {
    let mut out = format!("# {}\n", project);
    for file in files {
        let content = file.content.as_deref().unwrap_or("");
        let fence = fence_for(content);
        out.push_str(&format!("\n## {}\n\n{}{}\n", file.path, fence, file.language));
        out.push_str(content);
        if !content.is_empty() && !content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&fence);
        out.push('\n');
    }
    out
}

/// A backtick fence longer than any backtick run inside `content` (at least three)
fn fence_for(content: &str) -> String {
    let longest = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn to_json(project: &str, files: Vec<&FileRecord>) -> String {
    let doc = JsonDocument {
        project_name: project,
        files,
        timestamp: crate::app::chrono_now(),
    };
    match serde_json::to_string_pretty(&doc) {
        Ok(s) => s,
        Err(e) => {
            // Records are plain data; this only fails on a serde bug
            log::warn!("Failed to serialize context as json: {}", e);
            String::new()
        }
    }
}

// CDATA bodies are written raw: content containing "]]>" ends the section early.
fn to_xml(project: &str, files: &[&FileRecord]) -> String {
    let mut out = format!("<project name=\"{}\">\n", escape_attr(project));
    for file in files {
        let content = file.content.as_deref().unwrap_or("");
        out.push_str(&format!("  <file path=\"{}\">\n", escape_attr(&file.path)));
        out.push_str("<![CDATA[");
        out.push_str(content);
        out.push_str("]]>\n  </file>\n");
    }
    out.push_str("</project>\n");
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Rough token estimate: one token per four characters, rounded up.
/// This is a budget hint, not a tokenizer; it ignores language and encoding.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// File name for an exported context document
pub fn artifact_name(project: &str, format: OutputFormat) -> String {
    let stem: String = project
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "project".to_string() } else { stem };
    format!("{}-context.{}", stem, format.extension())
}

/// Serialize and write the context document into `dir`
pub fn export<'a, I>(project: &str, records: I, format: OutputFormat, dir: &Path) -> Result<PathBuf>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let body = serialize(project, records, format);
    let path = dir.join(artifact_name(project, format));
    std::fs::write(&path, body)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Exported context to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FileCatalog, FileKind};

    fn scenario() -> FileCatalog {
        let mut x = FileRecord::text("a/x.ts", "const x = 1;\n");
        x.selected = true;
        let y = FileRecord::text("a/y.ts", "const y = 2;\n");
        let mut z = FileRecord::text("b/z.ts", "export const z = 3;");
        z.selected = true;
        FileCatalog::new(vec![x, y, z])
    }

    #[test]
    fn markdown_has_one_fenced_block_per_selected_file_in_order() {
        let catalog = scenario();
        let md = serialize("demo", catalog.records(), OutputFormat::Markdown);

        assert!(md.starts_with("# demo\n"));
        assert_eq!(md.matches("```").count(), 4);
        let x = md.find("## a/x.ts").unwrap();
        let z = md.find("## b/z.ts").unwrap();
        assert!(x < z);
        assert!(!md.contains("a/y.ts"));
        assert!(md.contains("```typescript\nexport const z = 3;\n```\n"));
    }

    #[test]
    fn markdown_fence_outgrows_backticks_in_content() {
        let mut readme = FileRecord::text("README.md", "Usage:\n\n```sh\ncf .\n```\n");
        readme.selected = true;
        let md = serialize("demo", [&readme], OutputFormat::Markdown);
        assert!(md.contains("\n````markdown\nUsage:"));
        assert!(md.ends_with("```\n````\n"));

        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("a `tick` b"), "```");
        assert_eq!(fence_for("`````"), "``````");
    }

    #[test]
    fn markdown_and_xml_are_deterministic() {
        let catalog = scenario();
        for format in [OutputFormat::Markdown, OutputFormat::Xml] {
            let a = serialize("demo", catalog.records(), format);
            let b = serialize("demo", catalog.records(), format);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn json_is_deterministic_apart_from_timestamp() {
        let catalog = scenario();
        let mut a: serde_json::Value =
            serde_json::from_str(&serialize("demo", catalog.records(), OutputFormat::Json)).unwrap();
        let mut b: serde_json::Value =
            serde_json::from_str(&serialize("demo", catalog.records(), OutputFormat::Json)).unwrap();
        a.as_object_mut().unwrap().remove("timestamp");
        b.as_object_mut().unwrap().remove("timestamp");
        assert_eq!(a, b);
    }

    #[test]
    fn json_round_trips_selected_subset() {
        let catalog = scenario();
        let json = serialize("demo", catalog.records(), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["projectName"], "demo");
        assert!(value["timestamp"].is_string());

        let files: Vec<FileRecord> = serde_json::from_value(value["files"].clone()).unwrap();
        let pairs: Vec<(String, Option<String>)> =
            files.into_iter().map(|f| (f.path, f.content)).collect();
        let expected: Vec<(String, Option<String>)> = catalog
            .selected_records()
            .map(|r| (r.path.clone(), r.content.clone()))
            .collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn xml_wraps_content_in_cdata_without_escaping() {
        let mut rec = FileRecord::text("q&a/<t>.html", "<b>a & b</b>");
        rec.selected = true;
        let xml = serialize("p\"1", [&rec], OutputFormat::Xml);
        assert!(xml.starts_with("<project name=\"p&quot;1\">\n"));
        assert!(xml.contains("<file path=\"q&amp;a/&lt;t&gt;.html\">"));
        assert!(xml.contains("<![CDATA[<b>a & b</b>]]>"));
        assert!(xml.ends_with("</project>\n"));
    }

    #[test]
    fn non_text_records_never_serialized() {
        let mut bin = FileRecord::without_content("a.png", FileKind::Binary, 4);
        bin.selected = true;
        let md = serialize("p", [&bin], OutputFormat::Markdown);
        assert_eq!(md, "# p\n");
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("héllo wörld"), 3);
    }

    #[test]
    fn artifact_name_uses_format_extension() {
        assert_eq!(artifact_name("demo", OutputFormat::Markdown), "demo-context.md");
        assert_eq!(artifact_name("my app", OutputFormat::Json), "my_app-context.json");
        assert_eq!(artifact_name("", OutputFormat::Xml), "project-context.xml");
    }

    #[test]
    fn export_writes_file_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = scenario();
        let path = export("demo", catalog.records(), OutputFormat::Xml, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "demo-context.xml");
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("<file path=\"b/z.ts\">"));
    }
}

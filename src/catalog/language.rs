/// Language tag for a path, used for markdown fence tags and the language filter.
/// Unknown extensions map to "text".
pub fn language_for_path(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);

    match name {
        "Dockerfile" => return "dockerfile",
        "Makefile" | "makefile" | "GNUmakefile" => return "makefile",
        "CMakeLists.txt" => return "cmake",
        _ => {}
    }

    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return "text",
    };

    match ext.as_str() {
        "rs" => "rust",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "py" | "pyi" => "python",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "swift" => "swift",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "scala" => "scala",
        "lua" => "lua",
        "sh" | "bash" | "zsh" => "bash",
        "ps1" => "powershell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "vue" => "vue",
        "svelte" => "svelte",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "md" | "markdown" => "markdown",
        "proto" => "protobuf",
        "graphql" | "gql" => "graphql",
        _ => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::language_for_path;

    #[test]
    fn known_extensions() {
        assert_eq!(language_for_path("src/main.rs"), "rust");
        assert_eq!(language_for_path("a/x.ts"), "typescript");
        assert_eq!(language_for_path("web/App.TSX"), "tsx");
        assert_eq!(language_for_path("conf/app.yml"), "yaml");
    }

    #[test]
    fn well_known_file_names() {
        assert_eq!(language_for_path("docker/Dockerfile"), "dockerfile");
        assert_eq!(language_for_path("Makefile"), "makefile");
    }

    #[test]
    fn dotfiles_and_unknown_fall_back_to_text() {
        assert_eq!(language_for_path(".gitignore"), "text");
        assert_eq!(language_for_path("LICENSE"), "text");
        assert_eq!(language_for_path("data.bin"), "text");
    }
}

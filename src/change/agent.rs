use super::{RewriteRequest, Rewriter};
use crate::config::AgentConfig;
use crate::error::ReconstructionError;
use std::io::Write;
use std::process::{Command, Stdio};

/// Rewrites files by running an external AI command line.
///
/// Arguments may carry `{prompt}` (the full rewrite prompt) and `{file}`
/// (the catalog path). Without a `{prompt}` argument the prompt is written to
/// the command's stdin. The reply is read from stdout.
#[derive(Debug, Clone)]
pub struct AgentRewriter {
    config: AgentConfig,
}

impl AgentRewriter {
    pub fn new(config: AgentConfig) -> Self {
        AgentRewriter { config }
    }

    fn takes_prompt_arg(&self) -> bool {
        self.config.args.iter().any(|a| a.contains("{prompt}"))
    }
}

impl Rewriter for AgentRewriter {
    fn rewrite(&self, request: &RewriteRequest) -> Result<String, ReconstructionError> {
        let prompt = build_prompt(request);
        let (cmd, args) = resolve_command(&self.config, &prompt, &request.path);
        log::info!("Reconstructing {} with '{}'", request.path, cmd);

        let via_stdin = !self.takes_prompt_arg();
        let mut child = Command::new(&cmd)
            .args(&args)
            .stdin(if via_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ReconstructionError::Spawn {
                command: cmd.clone(),
                source,
            })?;

        if via_stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // The command may exit without reading; its status tells the story
                if let Err(e) = stdin.write_all(prompt.as_bytes()) {
                    log::warn!("Failed to send prompt to '{}': {}", cmd, e);
                }
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ReconstructionError::Failed {
                command: cmd,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let reply = String::from_utf8_lossy(&output.stdout);
        let body = strip_code_fence(&reply);
        if body.trim().is_empty() {
            return Err(ReconstructionError::EmptyOutput);
        }
        Ok(body)
    }
}

pub fn resolve_command(config: &AgentConfig, prompt: &str, file: &str) -> (String, Vec<String>) {
    let cmd = config.command.clone();
    let args = config
        .args
        .iter()
        .map(|a| a.replace("{prompt}", prompt).replace("{file}", file))
        .collect();
    (cmd, args)
}

pub fn build_prompt(request: &RewriteRequest) -> String {
    format!(
        "{}\n\nFile: {}\n\nOriginal content:\n```\n{}\n```\n\nProposed change:\n```\n{}\n```\n",
        request.system_prompt,
        request.path,
        request.original.trim_end_matches('\n'),
        request.fragment.trim_end_matches('\n'),
    )
}

/// Drop a single code fence wrapping the whole reply, if there is one.
/// Keeps a trailing newline when the body had any lines.
pub fn strip_code_fence(reply: &str) -> String {
    let trimmed = reply.trim();
    let inner = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
        .and_then(|rest| rest.split_once('\n').map(|(_lang, body)| body));

    match inner {
        Some(body) if !body.contains("\n```") => body.to_string(),
        _ => {
            let mut out = reply.trim_end_matches(['\n', '\r']).to_string();
            if !out.is_empty() {
                out.push('\n');
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RewriteRequest {
        RewriteRequest {
            id: 1,
            system_prompt: "Return the whole file.".into(),
            path: "src/lib.rs".into(),
            original: "fn a() {}\n".into(),
            fragment: "fn a() { todo() }".into(),
        }
    }

    #[test]
    fn resolve_substitutes_placeholders() {
        let config = AgentConfig {
            command: "claude".into(),
            args: vec!["--print".into(), "-p".into(), "{prompt}".into(), "--file={file}".into()],
        };
        let (cmd, args) = resolve_command(&config, "PROMPT", "src/lib.rs");
        assert_eq!(cmd, "claude");
        assert_eq!(args, vec!["--print", "-p", "PROMPT", "--file=src/lib.rs"]);
    }

    #[test]
    fn prompt_carries_original_and_fragment() {
        let prompt = build_prompt(&request());
        assert!(prompt.starts_with("Return the whole file."));
        assert!(prompt.contains("File: src/lib.rs"));
        assert!(prompt.contains("fn a() {}"));
        assert!(prompt.contains("fn a() { todo() }"));
    }

    #[test]
    fn strips_enclosing_fence() {
        assert_eq!(strip_code_fence("```rust\nfn a() {}\n```\n"), "fn a() {}\n");
        assert_eq!(strip_code_fence("```\nx\ny\n```"), "x\ny\n");
        assert_eq!(strip_code_fence("plain\n\n"), "plain\n");
    }

    #[test]
    fn keeps_inner_fences_intact() {
        let reply = "```md\n# t\n```rust\nx\n```\n```";
        assert!(strip_code_fence(reply).contains("```rust"));
    }

    #[cfg(unix)]
    #[test]
    fn runs_command_with_prompt_on_stdin() {
        let rewriter = AgentRewriter::new(AgentConfig {
            command: "sh".into(),
            args: vec!["-c".into(), "cat >/dev/null; printf 'fn b() {}\\n'".into()],
        });
        assert_eq!(rewriter.rewrite(&request()).unwrap(), "fn b() {}\n");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_reported() {
        let rewriter = AgentRewriter::new(AgentConfig {
            command: "sh".into(),
            args: vec!["-c".into(), "echo quota exceeded >&2; exit 3".into()],
        });
        let err = rewriter.rewrite(&request()).unwrap_err();
        assert!(matches!(err, ReconstructionError::Failed { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn missing_command_is_a_spawn_error() {
        let rewriter = AgentRewriter::new(AgentConfig {
            command: "cf-no-such-agent-binary".into(),
            args: vec!["{prompt}".into()],
        });
        assert!(matches!(
            rewriter.rewrite(&request()),
            Err(ReconstructionError::Spawn { .. })
        ));
    }
}

use async_trait::async_trait;
use dagcore::NodeError;
use std::process::Stdio;
use tokio::process::Command;

/// A rendered shell node, ready to hand to a runner
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub node_id: String,
    /// Command line after template rendering
    pub command: String,
    /// `command` split into program and arguments
    pub argv: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub simulated: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability the shell node runs commands through
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, NodeError>;
}

/// Spawns the program directly, without an intermediate shell, so rendered
/// values cannot inject shell syntax.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, NodeError> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or_else(|| NodeError::Configuration("empty command".to_string()))?;

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to spawn {}: {}", program, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            simulated: false,
        })
    }
}

/// Dry-run runner: nothing is executed, every node "prints" `Data_from_<id>`
pub struct SimulatedRunner;

#[async_trait]
impl CommandRunner for SimulatedRunner {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, NodeError> {
        Ok(CommandOutput {
            stdout: format!("Data_from_{}", invocation.node_id),
            stderr: String::new(),
            exit_code: Some(0),
            simulated: true,
        })
    }
}

/// Split a command line into words. Double and single quotes group words,
/// backslash escapes the next character outside single quotes.
///
/// Template tags (`{{ .. }}`, `{% .. %}`, `{# .. #}`) are copied through
/// untouched, whitespace and quotes included, so each one stays inside the
/// word it was written in and can be rendered there.
pub fn split_command(s: &str) -> Result<Vec<String>, NodeError> {
    let chars: Vec<char> = s.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut escape = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if escape {
            current.push(c);
            escape = false;
            i += 1;
            continue;
        }
        if let Some(end) = template_tag_end(&chars, i) {
            current.extend(&chars[i..end]);
            in_word = true;
            i = end;
            continue;
        }
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => current.push(c),
            (_, '\\') => {
                escape = true;
                in_word = true;
            }
            (Some('"'), '"') => quote = None,
            (Some(_), _) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, _) => {
                current.push(c);
                in_word = true;
            }
        }
        i += 1;
    }

    if escape || quote.is_some() {
        return Err(NodeError::Configuration(format!(
            "unterminated quote or escape in command: {}",
            s
        )));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// End (exclusive) of the template tag opening at `start`. An unclosed tag
/// runs to the end of the line and is left for the renderer to reject.
fn template_tag_end(chars: &[char], start: usize) -> Option<usize> {
    if chars[start] != '{' {
        return None;
    }
    let closer = match chars.get(start + 1) {
        Some('{') => '}',
        Some('%') => '%',
        Some('#') => '#',
        _ => return None,
    };
    let end = (start + 2..chars.len().saturating_sub(1))
        .find(|&j| chars[j] == closer && chars[j + 1] == '}')
        .map_or(chars.len(), |j| j + 2);
    Some(end)
}

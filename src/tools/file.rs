use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};

use super::{ExecutionContext, Tool};

/// Resolve a tool path against the task's working directory.
///
/// 1. Relative paths are joined onto the working directory
/// 2. ".." components are rejected
/// 3. The nearest existing ancestor is canonicalized so symlinks cannot escape
/// 4. The result must sit inside the working directory or an allowed root,
///    outside every denied root, and must not be a .env file or inside .git
pub(crate) fn resolve_path(path: &str, ctx: &ExecutionContext) -> Result<PathBuf> {
    let raw = Path::new(path);
    if raw.components().any(|c| c == Component::ParentDir) {
        anyhow::bail!("path traversal detected: '..' is not allowed in paths");
    }

    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        ctx.working_dir().join(raw)
    };

    let canonical =
        canonicalize_existing_prefix(&joined).with_context(|| format!("failed to resolve path: {}", path))?;
    let root = std::fs::canonicalize(ctx.working_dir()).with_context(|| {
        format!(
            "failed to resolve working directory: {}",
            ctx.working_dir().display()
        )
    })?;

    let policy = &ctx.policy;
    for denied in &policy.deny_paths {
        if canonical.starts_with(canonical_root(denied)) {
            anyhow::bail!("access to {} is denied by policy", denied);
        }
    }

    let allowed = canonical.starts_with(&root)
        || policy
            .allow_paths
            .iter()
            .any(|allowed| canonical.starts_with(canonical_root(allowed)));
    if !allowed {
        anyhow::bail!(
            "path is outside the working directory: {}",
            canonical.display()
        );
    }

    let path_str = canonical.to_string_lossy();
    if path_str.contains("/.git/") || path_str.ends_with("/.git") {
        anyhow::bail!("access to .git directories is not allowed");
    }
    if let Some(file_name) = canonical.file_name() {
        let name = file_name.to_string_lossy();
        if name == ".env" || name.starts_with(".env.") {
            anyhow::bail!("access to .env files is not allowed");
        }
    }

    Ok(canonical)
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest.
fn canonicalize_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut canonical = std::fs::canonicalize(existing)?;
    for component in rest.into_iter().rev() {
        canonical.push(component);
    }
    Ok(canonical)
}

fn canonical_root(root: &str) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| PathBuf::from(root))
}

/// Tool for reading files
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Relative paths resolve against the project root."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<String> {
        let path = params["path"]
            .as_str()
            .context("missing 'path' parameter")?;

        let resolved = resolve_path(path, ctx)?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .with_context(|| format!("failed to read file: {}", path))?;

        ctx.log(format!("read_file: {} ({} bytes)", path, content.len()));
        Ok(content)
    }
}

/// Tool for writing files
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories if needed. Design files belong under .superdesign/design_iterations/."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<String> {
        let path = params["path"]
            .as_str()
            .context("missing 'path' parameter")?;
        let content = params["content"]
            .as_str()
            .context("missing 'content' parameter")?;

        let resolved = resolve_path(path, ctx)?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .with_context(|| format!("failed to write file: {}", path))?;

        ctx.log(format!("write_file: {} ({} bytes)", path, content.len()));
        Ok(format!(
            "Successfully wrote {} bytes to {}",
            content.len(),
            path
        ))
    }
}

/// Tool for editing files (find and replace)
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing old_string with new_string. The old_string must be unique in the file."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The string to find and replace (must be unique in the file)"
                },
                "new_string": {
                    "type": "string",
                    "description": "The string to replace it with"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<String> {
        let path = params["path"]
            .as_str()
            .context("missing 'path' parameter")?;
        let old_string = params["old_string"]
            .as_str()
            .context("missing 'old_string' parameter")?;
        let new_string = params["new_string"]
            .as_str()
            .context("missing 'new_string' parameter")?;

        let resolved = resolve_path(path, ctx)?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .with_context(|| format!("failed to read file: {}", path))?;

        let count = content.matches(old_string).count();
        if count == 0 {
            anyhow::bail!("old_string not found in file: {}", path);
        }
        if count > 1 {
            anyhow::bail!(
                "old_string found {} times in file (must be unique): {}",
                count,
                path
            );
        }

        let new_content = content.replacen(old_string, new_string, 1);

        tokio::fs::write(&resolved, &new_content)
            .await
            .with_context(|| format!("failed to write file: {}", path))?;

        ctx.log(format!("edit_file: {}", path));
        Ok(format!("Successfully edited {}", path))
    }
}

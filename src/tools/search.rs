use anyhow::{Context, Result};
use async_trait::async_trait;
use glob::glob;
use serde_json::{Value, json};

use super::{ExecutionContext, Tool, resolve_path};

const MAX_RESULTS: usize = 100;

/// Tool for finding files by glob pattern inside the project
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g., '.superdesign/design_iterations/*.html', 'src/**/*.css')"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The glob pattern to match files"
                },
                "base_dir": {
                    "type": "string",
                    "description": "Optional directory to search from (default: project root)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<String> {
        let pattern = params["pattern"]
            .as_str()
            .context("missing 'pattern' parameter")?;

        let base = resolve_path(params["base_dir"].as_str().unwrap_or("."), ctx)?;
        let full_pattern = format!("{}/{}", base.display(), pattern.trim_start_matches("./"));

        let entries = glob(&full_pattern)
            .with_context(|| format!("invalid glob pattern: {}", pattern))?;

        let root = std::fs::canonicalize(ctx.working_dir()).unwrap_or_else(|_| ctx.working_dir.clone());
        let mut matches = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => {
                    // Filter results through path validation
                    let path_str = path.display().to_string();
                    if resolve_path(&path_str, ctx).is_ok() {
                        let shown = path
                            .strip_prefix(&root)
                            .map(|p| p.display().to_string())
                            .unwrap_or(path_str);
                        matches.push(shown);
                        if matches.len() >= MAX_RESULTS {
                            break;
                        }
                    }
                }
                Err(e) => {
                    // Skip entries we can't read
                    tracing::debug!("glob entry error: {}", e);
                }
            }
        }
        matches.sort();

        ctx.log(format!("glob: {} ({} matches)", pattern, matches.len()));

        if matches.is_empty() {
            Ok("No files found matching pattern".to_string())
        } else {
            let truncated = if matches.len() >= MAX_RESULTS {
                format!("\n... (truncated at {} results)", MAX_RESULTS)
            } else {
                String::new()
            };
            Ok(format!(
                "Found {} files:\n{}{}",
                matches.len(),
                matches.join("\n"),
                truncated
            ))
        }
    }
}

//! Filesystem tool implementations
//!
//! Behaviors bound to the built-in tools:
//! - file-read: Read file contents with size limits
//! - file-write: Write or append content
//! - list-dir: List directory contents
//!
//! Handlers expect the `path` parameter to be the normalized absolute path
//! produced by `PathValidator`; the executor substitutes it before dispatch.

use crate::errors::{Result, SandboxError};
use crate::tools::registry::ToolHandler;
use crate::tools::types::{ToolParams, PATH_PARAMETER};
use crate::types::ExecutionContext;
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Upper bound on entries returned by one listing
pub const MAX_LIST_ENTRIES: usize = 10_000;

/// Read file contents
pub async fn read_file(path: &Path, max_output_size: usize) -> Result<serde_json::Value> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| io_failure("Cannot access", path, e))?;

    if !metadata.is_file() {
        return Err(SandboxError::Execution(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }

    if metadata.len() > max_output_size as u64 {
        return Err(SandboxError::Execution(format!(
            "File too large: {} bytes (max: {} bytes)",
            metadata.len(),
            max_output_size
        )));
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| io_failure("Failed to read", path, e))?;

    Ok(json!({
        "path": path.display().to_string(),
        "content": content,
        "size": metadata.len(),
    }))
}

/// Write or append file contents.
///
/// A missing parent directory is an error unless `create_dirs` is set.
pub async fn write_file(
    path: &Path,
    content: &str,
    append: bool,
    create_dirs: bool,
    max_output_size: usize,
) -> Result<serde_json::Value> {
    if content.len() > max_output_size {
        return Err(SandboxError::Execution(format!(
            "Content too large: {} bytes (max: {} bytes)",
            content.len(),
            max_output_size
        )));
    }

    if let Some(parent) = path.parent() {
        if !fs::try_exists(parent).await.unwrap_or(false) {
            if create_dirs {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_failure("Failed to create parent directory", parent, e))?;
            } else {
                return Err(SandboxError::Execution(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }
    }

    if append {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| io_failure("Failed to open", path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_failure("Failed to append to", path, e))?;
        file.flush()
            .await
            .map_err(|e| io_failure("Failed to flush", path, e))?;
    } else {
        fs::write(path, content)
            .await
            .map_err(|e| io_failure("Failed to write", path, e))?;
    }

    Ok(json!({
        "path": path.display().to_string(),
        "bytes_written": content.len(),
        "append": append,
    }))
}

/// List directory contents; symlinked directories are never descended into
pub async fn list_dir(path: &Path, recursive: bool) -> Result<serde_json::Value> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| io_failure("Cannot access", path, e))?;

    if !metadata.is_dir() {
        return Err(SandboxError::Execution(format!(
            "Path is not a directory: {}",
            path.display()
        )));
    }

    let mut entries = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    let mut truncated = false;

    'walk: while let Some(dir) = pending.pop() {
        let mut read_dir = fs::read_dir(&dir)
            .await
            .map_err(|e| io_failure("Failed to read directory", &dir, e))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| io_failure("Failed to read entry in", &dir, e))?
        {
            if entries.len() >= MAX_LIST_ENTRIES {
                truncated = true;
                break 'walk;
            }

            let entry_path = entry.path();
            let name = entry_path
                .strip_prefix(path)
                .unwrap_or(&entry_path)
                .to_string_lossy()
                .to_string();

            let kind = match entry.file_type().await {
                Ok(t) if t.is_symlink() => "symlink",
                Ok(t) if t.is_dir() => "dir",
                Ok(t) if t.is_file() => "file",
                Ok(_) => "other",
                Err(_) => "unknown",
            };

            if recursive && kind == "dir" {
                pending.push(entry_path.clone());
            }

            entries.push((name, kind));
        }
    }

    entries.sort();

    let entries: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|(name, kind)| json!({ "name": name, "type": kind }))
        .collect();

    Ok(json!({
        "path": path.display().to_string(),
        "entries": entries,
        "truncated": truncated,
    }))
}

fn io_failure(action: &str, path: &Path, e: std::io::Error) -> SandboxError {
    SandboxError::Execution(format!("{} {}: {}", action, path.display(), e))
}

fn required_path(params: &ToolParams) -> Result<PathBuf> {
    params
        .get(PATH_PARAMETER)
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| SandboxError::Validation("Missing required parameter 'path'".to_string()))
}

fn flag(params: &ToolParams, name: &str) -> bool {
    params.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Behavior of `file-read`
#[derive(Debug, Clone)]
pub struct FileReadTool {
    pub max_output_size: usize,
}

#[async_trait]
impl ToolHandler for FileReadTool {
    async fn call(
        &self,
        _context: &ExecutionContext,
        params: &ToolParams,
    ) -> Result<serde_json::Value> {
        let path = required_path(params)?;
        read_file(&path, self.max_output_size).await
    }
}

/// Behavior of `file-write`
#[derive(Debug, Clone)]
pub struct FileWriteTool {
    pub max_output_size: usize,
}

#[async_trait]
impl ToolHandler for FileWriteTool {
    async fn call(
        &self,
        _context: &ExecutionContext,
        params: &ToolParams,
    ) -> Result<serde_json::Value> {
        let path = required_path(params)?;
        let content = params
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SandboxError::Validation("Missing required parameter 'content'".to_string())
            })?;

        write_file(
            &path,
            content,
            flag(params, "append"),
            flag(params, "create_dirs"),
            self.max_output_size,
        )
        .await
    }
}

/// Behavior of `list-dir`
#[derive(Debug, Clone, Default)]
pub struct ListDirTool;

#[async_trait]
impl ToolHandler for ListDirTool {
    async fn call(
        &self,
        _context: &ExecutionContext,
        params: &ToolParams,
    ) -> Result<serde_json::Value> {
        let path = required_path(params)?;
        list_dir(&path, flag(params, "recursive")).await
    }
}

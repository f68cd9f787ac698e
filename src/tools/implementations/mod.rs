//! Tool implementations module

pub mod filesystem;

use crate::tools::registry::{ToolHandlerRef, FILE_READ, FILE_WRITE, LIST_DIR};
use std::collections::HashMap;
use std::sync::Arc;

// Re-export for convenience
pub use filesystem::{list_dir, read_file, write_file, FileReadTool, FileWriteTool, ListDirTool};

/// Behaviors for the built-in filesystem tools, keyed by tool id
pub fn filesystem_handlers(max_output_size: usize) -> HashMap<String, ToolHandlerRef> {
    let mut handlers: HashMap<String, ToolHandlerRef> = HashMap::new();
    handlers.insert(
        FILE_READ.to_string(),
        Arc::new(FileReadTool { max_output_size }),
    );
    handlers.insert(
        FILE_WRITE.to_string(),
        Arc::new(FileWriteTool { max_output_size }),
    );
    handlers.insert(LIST_DIR.to_string(), Arc::new(ListDirTool));
    handlers
}

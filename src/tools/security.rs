//! Path confinement for filesystem-affecting tools
//!
//! Confines candidate paths to a fixed set of allowed roots:
//! - Null bytes rejected before any decoding
//! - Single-level percent-decoding, then re-checked for traversal markers
//! - Lexical `..` resolution (no filesystem access during validation)
//! - Component-wise root prefix check (`/tmp2` is never inside `/tmp`)
//!
//! Traversal policy: any `..` step that leaves every allowed root is a
//! traversal, even if later segments would re-enter one. Segments made only
//! of three or more dots, `..` next to a backslash, and percent sequences that
//! survive one decoding pass are rejected as traversal attempts as well.

use crate::errors::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Encoded markers that must not survive a single decoding pass
const ENCODED_TRAVERSAL_MARKERS: [&str; 3] = ["%2e", "%2f", "%5c"];

/// Result of validating one candidate path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathValidationResult {
    /// Whether the path may be touched
    pub valid: bool,

    /// Rejection reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Fully normalized absolute path when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_path: Option<PathBuf>,
}

impl PathValidationResult {
    fn accepted(canonical_path: PathBuf) -> Self {
        Self {
            valid: true,
            error: None,
            canonical_path: Some(canonical_path),
        }
    }

    fn rejected(error: &SandboxError) -> Self {
        Self {
            valid: false,
            error: Some(error.to_string()),
            canonical_path: None,
        }
    }
}

/// Validates candidate paths against an ordered set of allowed roots
#[derive(Debug, Clone)]
pub struct PathValidator {
    /// Normalized absolute roots, in configuration order
    allowed_roots: Vec<PathBuf>,

    /// Base for relative paths
    working_dir: PathBuf,
}

impl PathValidator {
    /// Create a validator; relative input resolves against `working_dir`
    pub fn new<I, P>(allowed_roots: I, working_dir: impl AsRef<Path>) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut roots: Vec<PathBuf> = Vec::new();
        for root in allowed_roots {
            let root = root.as_ref();
            if !root.is_absolute() {
                return Err(SandboxError::ConfigError(format!(
                    "Allowed root must be absolute: {}",
                    root.display()
                )));
            }
            let root = lexical_normalize(root);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        if roots.is_empty() {
            return Err(SandboxError::ConfigError(
                "At least one allowed root is required".to_string(),
            ));
        }

        let working_dir = working_dir.as_ref();
        if !working_dir.is_absolute() {
            return Err(SandboxError::ConfigError(format!(
                "Working directory must be absolute: {}",
                working_dir.display()
            )));
        }

        debug!(roots = ?roots, working_dir = %working_dir.display(), "PathValidator::new");

        Ok(Self {
            allowed_roots: roots,
            working_dir: lexical_normalize(working_dir),
        })
    }

    /// Create a validator whose working directory is the first root
    pub fn with_roots<I, P>(allowed_roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots: Vec<PathBuf> = allowed_roots
            .into_iter()
            .map(|r| r.as_ref().to_path_buf())
            .collect();
        let working_dir = roots.first().cloned().unwrap_or_default();
        Self::new(roots, working_dir)
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Validate a candidate path
    pub fn validate(&self, path: &str) -> PathValidationResult {
        match self.check(path) {
            Ok(canonical) => PathValidationResult::accepted(canonical),
            Err(e) => PathValidationResult::rejected(&e),
        }
    }

    /// Validate a candidate path, returning the normalized absolute path.
    ///
    /// Never touches the filesystem.
    pub fn check(&self, path: &str) -> Result<PathBuf> {
        let outcome = self.check_inner(path);
        if let Err(e) = &outcome {
            warn!(path = %path.escape_debug(), error = %e, "Path rejected");
        }
        outcome
    }

    fn check_inner(&self, path: &str) -> Result<PathBuf> {
        // Null bytes first: they can truncate later checks
        if path.contains('\0') {
            return Err(SandboxError::InvalidPath("null byte in path".to_string()));
        }

        if path.trim().is_empty() {
            return Err(SandboxError::InvalidPath("path is empty".to_string()));
        }

        let decoded = urlencoding::decode(path).map_err(|_| {
            SandboxError::InvalidPath("percent-encoding does not decode to UTF-8".to_string())
        })?;

        if decoded.contains('\0') {
            return Err(SandboxError::InvalidPath(
                "encoded null byte in path".to_string(),
            ));
        }

        if has_traversal_markers(&decoded) {
            return Err(SandboxError::PathTraversal {
                path: path.to_string(),
            });
        }

        let expanded = expand_home(&decoded);
        let candidate = Path::new(&expanded);
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.working_dir.join(candidate)
        };

        let resolved = self.resolve(&absolute, path)?;

        if !self.is_within_roots(&resolved) {
            return Err(SandboxError::PathNotAllowed {
                path: resolved.display().to_string(),
            });
        }

        Ok(resolved)
    }

    /// Lexically resolve `.`/`..` and repeated separators.
    ///
    /// Every `..` must land inside some allowed root.
    fn resolve(&self, absolute: &Path, original: &str) -> Result<PathBuf> {
        let mut resolved = PathBuf::new();

        for component in absolute.components() {
            match component {
                Component::Prefix(prefix) => resolved.push(prefix.as_os_str()),
                Component::RootDir => resolved.push(Component::RootDir.as_os_str()),
                Component::CurDir => {}
                Component::Normal(segment) => resolved.push(segment),
                Component::ParentDir => {
                    if !resolved.pop() || !self.is_within_roots(&resolved) {
                        return Err(SandboxError::PathTraversal {
                            path: original.to_string(),
                        });
                    }
                }
            }
        }

        Ok(resolved)
    }

    /// Component-wise ancestor check against the allowed roots
    pub fn is_within_roots(&self, path: &Path) -> bool {
        self.allowed_roots.iter().any(|root| path.starts_with(root))
    }

    /// Verify that symlinks along an already-validated path do not lead
    /// outside the allowed roots. Checks the nearest existing ancestor.
    pub fn check_real_path(&self, resolved: &Path) -> Result<()> {
        let mut existing = resolved;
        while fs::symlink_metadata(existing).is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return Ok(()),
            }
        }

        let real = existing.canonicalize().map_err(|e| SandboxError::PathNotAllowed {
            path: format!("{} (unresolvable: {})", resolved.display(), e),
        })?;

        let inside = self.allowed_roots.iter().any(|root| {
            let real_root = root.canonicalize().unwrap_or_else(|_| root.clone());
            real.starts_with(&real_root) || real.starts_with(root)
        });

        if inside {
            Ok(())
        } else {
            warn!(path = %resolved.display(), real = %real.display(), "Symlink escapes allowed roots");
            Err(SandboxError::PathNotAllowed {
                path: format!("{} (resolves to {})", resolved.display(), real.display()),
            })
        }
    }

    /// Whether the path is valid and readable. Missing files cannot be read.
    pub fn can_read(&self, path: &str) -> bool {
        let Ok(resolved) = self.check(path) else {
            return false;
        };
        if self.check_real_path(&resolved).is_err() {
            return false;
        }

        match fs::metadata(&resolved) {
            Ok(meta) if meta.is_dir() => {
                has_access(&resolved, AccessKind::ReadDir) && fs::read_dir(&resolved).is_ok()
            }
            Ok(_) => has_access(&resolved, AccessKind::Read) && fs::File::open(&resolved).is_ok(),
            Err(_) => false,
        }
    }

    /// Whether the path is valid and writable.
    ///
    /// A missing target is writable when its parent directory exists and the
    /// caller may create entries in it.
    pub fn can_write(&self, path: &str) -> bool {
        let Ok(resolved) = self.check(path) else {
            return false;
        };
        if self.check_real_path(&resolved).is_err() {
            return false;
        }

        match fs::metadata(&resolved) {
            Ok(meta) if meta.is_dir() => false,
            Ok(_) => has_access(&resolved, AccessKind::Write),
            Err(_) => resolved
                .parent()
                .filter(|parent| fs::metadata(parent).map(|m| m.is_dir()).unwrap_or(false))
                .map(|parent| has_access(parent, AccessKind::CreateIn))
                .unwrap_or(false),
        }
    }
}

/// Access a caller needs on an existing path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessKind {
    Read,
    ReadDir,
    Write,
    CreateIn,
}

/// Ask the OS whether the calling user has the access, honoring ownership
/// and group membership rather than just the mode bits.
#[cfg(unix)]
fn has_access(path: &Path, kind: AccessKind) -> bool {
    use nix::unistd::{access, AccessFlags};

    let flags = match kind {
        AccessKind::Read => AccessFlags::R_OK,
        AccessKind::ReadDir => AccessFlags::R_OK | AccessFlags::X_OK,
        AccessKind::Write => AccessFlags::W_OK,
        AccessKind::CreateIn => AccessFlags::W_OK | AccessFlags::X_OK,
    };
    access(path, flags).is_ok()
}

#[cfg(not(unix))]
fn has_access(path: &Path, kind: AccessKind) -> bool {
    match kind {
        AccessKind::Read | AccessKind::ReadDir => fs::metadata(path).is_ok(),
        AccessKind::Write | AccessKind::CreateIn => fs::metadata(path)
            .map(|meta| !meta.permissions().readonly())
            .unwrap_or(false),
    }
}

/// Patterns rejected even where a naive resolver would call them safe
fn has_traversal_markers(decoded: &str) -> bool {
    if decoded
        .split(|c: char| c == '/' || c == '\\')
        .any(|segment| segment.len() >= 3 && segment.chars().all(|c| c == '.'))
    {
        return true;
    }

    if decoded.contains("..\\") || decoded.contains("\\..") {
        return true;
    }

    let lowered = decoded.to_ascii_lowercase();
    ENCODED_TRAVERSAL_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
        || lowered.contains("%00")
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> String {
    let home = || dirs::home_dir().map(|h| h.display().to_string());

    if path == "~" {
        home().unwrap_or_else(|| path.to_string())
    } else if let Some(rest) = path.strip_prefix("~/") {
        match home() {
            Some(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            None => path.to_string(),
        }
    } else {
        path.to_string()
    }
}

/// Normalize without touching the filesystem; `..` at the root stays at the root
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

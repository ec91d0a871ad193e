//! # Path Resolver
//!
//! Pure functions that turn a raw attribute value into an absolute path.
//!
//! ## Resolution Order
//!
//! First match wins; no backtracking once a rule accepts a candidate:
//!
//! 1. `AsIs`: the value is absolute and names an existing file, or its
//!    parent directory exists (the file-system root does not count).
//! 2. `WorkspaceRelative`: strip leading separators and join onto the
//!    context root. Accepted if the file exists, or if the value carries a
//!    directory component whose directory exists under the root.
//! 3. `Environment`: expand `$VAR`, `${VAR}` and `%VAR%`; accepted if the
//!    expansion changed the value and the result passes rule 1.
//! 4. `ResourceFolder`: `root / resource_subfolder / basename`, if it exists.
//! 5. `Unresolved`: the normalized raw value, reported as missing.
//!
//! Paths are handled as strings with `/` separators. Both `/` and `\` are
//! accepted on input.

use crate::primitives::{SOURCE_EXTENSION, WORKSPACE_KEY};
use crate::{FileSystem, ReferenceContext};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// =============================================================================
// RESOLUTION RESULT
// =============================================================================

/// Which rule produced a resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveRule {
    AsIs,
    WorkspaceRelative,
    Environment,
    ResourceFolder,
    Unresolved,
}

/// Output of `PathResolver::resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Normalized path. Empty only for an empty raw value.
    pub path: String,
    pub rule: ResolveRule,
}

impl Resolution {
    /// Dedup key of the resolved path.
    #[must_use]
    pub fn key(&self) -> String {
        PathResolver::normalized_key(&self.path)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.rule != ResolveRule::Unresolved
    }
}

// =============================================================================
// PATH RESOLVER
// =============================================================================

/// `$VAR`, `${VAR}` and `%VAR%` references.
static ENV_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)|%([A-Za-z_][A-Za-z0-9_]*)%")
        .ok()
});

/// Stateless path arithmetic and resolution.
pub struct PathResolver;

impl PathResolver {
    // -------------------------------------------------------------------------
    // Lexical helpers
    // -------------------------------------------------------------------------

    /// Lexically normalize a path.
    ///
    /// Converts `\` to `/`, collapses repeated separators, removes `.`
    /// segments, folds `..` and drops trailing separators.
    /// A leading `//` (UNC) and a drive prefix (`C:/`) are kept.
    #[must_use]
    pub fn normalize(path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        let unified = path.replace('\\', "/");
        let (prefix, rest) = Self::split_prefix(&unified);

        let mut segments: Vec<&str> = Vec::new();
        for segment in rest.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.last().is_some_and(|last| *last != "..") {
                        segments.pop();
                    } else if prefix.is_empty() {
                        segments.push("..");
                    }
                }
                other => segments.push(other),
            }
        }

        let joined = format!("{prefix}{}", segments.join("/"));
        if joined.is_empty() {
            ".".to_string()
        } else {
            joined
        }
    }

    /// Split an already `/`-unified path into its root prefix and the rest.
    fn split_prefix(path: &str) -> (&str, &str) {
        if let Some(rest) = path.strip_prefix("//") {
            return ("//", rest);
        }
        if let Some(rest) = path.strip_prefix('/') {
            return ("/", rest);
        }
        let bytes = path.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            if bytes.get(2) == Some(&b'/') {
                return (&path[..3], &path[3..]);
            }
            return (&path[..2], &path[2..]);
        }
        ("", path)
    }

    /// Dedup key: the normalized path, case-folded.
    ///
    /// Case is folded on every platform so the key is host-independent.
    #[must_use]
    pub fn normalized_key(path: &str) -> String {
        Self::normalize(path).to_lowercase()
    }

    /// True for `/x`, `\x`, `//server` and `C:/x` forms.
    #[must_use]
    pub fn is_absolute(path: &str) -> bool {
        let bytes = path.as_bytes();
        match bytes.first() {
            Some(b'/' | b'\\') => true,
            Some(first) => {
                first.is_ascii_alphabetic()
                    && bytes.get(1) == Some(&b':')
                    && matches!(bytes.get(2), Some(b'/' | b'\\'))
            }
            None => false,
        }
    }

    /// True if `path` is a bare root: `/`, `//` or `C:/`.
    #[must_use]
    pub fn is_root(path: &str) -> bool {
        let normalized = Self::normalize(path);
        let (prefix, rest) = Self::split_prefix(&normalized);
        !prefix.is_empty() && rest.is_empty()
    }

    /// Parent directory, or `None` for a root or a single relative segment.
    #[must_use]
    pub fn parent(path: &str) -> Option<String> {
        let normalized = Self::normalize(path);
        let (prefix, rest) = Self::split_prefix(&normalized);
        if rest.is_empty() {
            return None;
        }
        match rest.rfind('/') {
            Some(idx) => Some(format!("{prefix}{}", &rest[..idx])),
            None if prefix.is_empty() => None,
            None => Some(prefix.to_string()),
        }
    }

    /// Last path segment.
    #[must_use]
    pub fn basename(path: &str) -> &str {
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }

    /// Basename without its extension.
    #[must_use]
    pub fn file_stem(path: &str) -> &str {
        let base = Self::basename(path);
        match base.rfind('.') {
            Some(idx) if idx > 0 => &base[..idx],
            _ => base,
        }
    }

    /// Join `relative` onto `base`. An absolute `relative` wins.
    #[must_use]
    pub fn join(base: &str, relative: &str) -> String {
        if base.is_empty() || Self::is_absolute(relative) {
            Self::normalize(relative)
        } else {
            Self::normalize(&format!("{base}/{relative}"))
        }
    }

    /// Path of `path` relative to `root`, if `path` lies below it.
    ///
    /// The prefix comparison ignores ASCII case.
    #[must_use]
    pub fn strip_root(path: &str, root: &str) -> Option<String> {
        let path = Self::normalize(path);
        let mut prefix = Self::normalize(root);
        if prefix.is_empty() {
            return None;
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let head = path.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(&prefix) {
            return None;
        }
        path.get(prefix.len()..)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }

    /// Expand environment references. Unknown variables are left untouched.
    #[must_use]
    pub fn expand_env(raw: &str, fs: &dyn FileSystem) -> String {
        let Some(pattern) = ENV_PATTERN.as_ref() else {
            return raw.to_string();
        };
        pattern
            .replace_all(raw, |caps: &Captures<'_>| {
                let whole = caps.get(0).map_or("", |m| m.as_str());
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .and_then(|name| fs.env_var(name.as_str()))
                    .unwrap_or_else(|| whole.to_string())
            })
            .into_owned()
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    /// Resolve a raw attribute value against a context.
    ///
    /// Pure with respect to the file-system state seen through `fs`.
    #[must_use]
    pub fn resolve(raw: &str, context: &ReferenceContext, fs: &dyn FileSystem) -> Resolution {
        let raw = raw.trim();
        if raw.is_empty() {
            return Resolution {
                path: String::new(),
                rule: ResolveRule::Unresolved,
            };
        }
        let normalized = Self::normalize(raw);

        if Self::accepts_as_is(&normalized, fs) {
            return Resolution {
                path: normalized,
                rule: ResolveRule::AsIs,
            };
        }

        let stripped = normalized.trim_start_matches('/');
        if !context.root_path.is_empty() && !stripped.is_empty() {
            let candidate = Self::join(&context.root_path, stripped);
            let dir_exists = stripped.contains('/')
                && Self::parent(&candidate).is_some_and(|dir| fs.is_dir(&dir));
            if fs.is_file(&candidate) || dir_exists {
                return Resolution {
                    path: candidate,
                    rule: ResolveRule::WorkspaceRelative,
                };
            }
        }

        let expanded = Self::expand_env(raw, fs);
        if expanded != raw {
            let expanded = Self::normalize(&expanded);
            if Self::accepts_as_is(&expanded, fs) {
                return Resolution {
                    path: expanded,
                    rule: ResolveRule::Environment,
                };
            }
        }

        if !context.root_path.is_empty() {
            let folder = Self::join(&context.root_path, &context.resource_subfolder);
            let candidate = Self::join(&folder, Self::basename(&normalized));
            if fs.is_file(&candidate) {
                return Resolution {
                    path: candidate,
                    rule: ResolveRule::ResourceFolder,
                };
            }
        }

        tracing::trace!(raw, "resolution exhausted every rule");
        Resolution {
            path: normalized,
            rule: ResolveRule::Unresolved,
        }
    }

    fn accepts_as_is(path: &str, fs: &dyn FileSystem) -> bool {
        Self::is_absolute(path)
            && (fs.is_file(path)
                || Self::parent(path).is_some_and(|dir| !Self::is_root(&dir) && fs.is_dir(&dir)))
    }

    // -------------------------------------------------------------------------
    // Workspace conversions
    // -------------------------------------------------------------------------

    /// Workspace-relative form of `path` (`/` + path below `root`).
    ///
    /// A path that mentions the resource subfolder is first rebased onto
    /// the workspace's own resource folder. Returns `None` if the rebased
    /// file does not exist or does not live under `root`.
    #[must_use]
    pub fn workspace_relative(
        path: &str,
        root: &str,
        resource_subfolder: &str,
        fs: &dyn FileSystem,
    ) -> Option<String> {
        let mut target = Self::normalize(path);
        let marker = format!("/{}/", Self::normalize(resource_subfolder));
        if let Some(idx) = target.rfind(&marker) {
            let tail = target[idx + marker.len()..].to_string();
            target = Self::join(&Self::join(root, resource_subfolder), &tail);
        }
        if !fs.is_file(&target) {
            return None;
        }
        Self::strip_root(&target, root).map(|rel| format!("/{rel}"))
    }

    // -------------------------------------------------------------------------
    // Source lookup
    // -------------------------------------------------------------------------

    /// Candidate source names for a texture stem, longest first.
    ///
    /// `wall_brick_dif` yields `wall_brick_dif.psd`, `wall_brick.psd`,
    /// `wall.psd`.
    #[must_use]
    pub fn filename_variants(stem: &str, extension: &str) -> Vec<String> {
        let mut variants = Vec::new();
        let mut current = String::new();
        for token in stem.split('_') {
            if !current.is_empty() || !variants.is_empty() {
                current.push('_');
            }
            current.push_str(token);
            variants.push(format!("{current}.{extension}"));
        }
        variants.reverse();
        variants
    }

    /// Find the editable source of a texture.
    ///
    /// Folders are scanned in order: the source pattern if it is absolute,
    /// the texture's folder, the pattern relative to the texture's folder
    /// (`<WORKSPACE>` read as `..`), the workspace resource folder, and the
    /// pattern anchored at the workspace root.
    #[must_use]
    pub fn source_file(
        path: &str,
        workspace_root: &str,
        resource_subfolder: &str,
        source_pattern: &str,
        fs: &dyn FileSystem,
    ) -> Option<String> {
        let folder = Self::parent(path).unwrap_or_default();
        let variants = Self::filename_variants(Self::file_stem(path), SOURCE_EXTENSION);

        let mut folders = Vec::new();
        if !source_pattern.contains(WORKSPACE_KEY) {
            folders.push(Self::normalize(source_pattern));
        }
        folders.push(folder.clone());
        folders.push(Self::join(
            &folder,
            &source_pattern.replace(WORKSPACE_KEY, ".."),
        ));
        folders.push(Self::join(workspace_root, resource_subfolder));
        folders.push(Self::normalize(
            &source_pattern.replace(WORKSPACE_KEY, workspace_root),
        ));

        folders
            .iter()
            .filter(|dir| fs.is_dir(dir))
            .find_map(|dir| {
                variants
                    .iter()
                    .map(|name| Self::join(dir, name))
                    .find(|candidate| fs.is_file(candidate))
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================

use crate::error::{BuildError, BuildResult};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};
use tracing::{debug, info, instrument};

pub const DOCKERIGNORE: &str = ".dockerignore";

/// `.dockerignore`-style exclusions. Patterns are relative to the context
/// root: `*` stays within one path component, `**` spans any number of
/// them, and a leading `!` re-includes what an earlier pattern excluded.
/// Matching a directory excludes everything below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Self::default();
        for pattern in patterns {
            rules.exclude(pattern.as_ref());
        }
        rules
    }

    /// Appends one pattern. Later patterns win over earlier ones.
    pub fn exclude(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            return;
        }
        let (negated, body) = match raw.strip_prefix('!') {
            Some(body) => (true, body.trim()),
            None => (false, raw),
        };
        let body = body
            .trim_start_matches("./")
            .trim_start_matches('/')
            .trim_end_matches('/');
        if body.is_empty() {
            return;
        }
        let pattern = if negated {
            format!("!{body}")
        } else {
            body.to_string()
        };
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    /// Adds the lines of `.dockerignore` when the context has one.
    pub fn extend_from_dockerignore(&mut self, root: &Path) -> BuildResult<()> {
        let path = root.join(DOCKERIGNORE);
        if path.is_file() {
            let contents = fs::read_to_string(&path)?;
            for line in contents.lines() {
                self.exclude(line);
            }
        }
        Ok(())
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Compiles the patterns for `root`. Gitignore patterns without a slash
    /// match at any depth, so every pattern not starting with `**` is
    /// anchored to the root first.
    pub fn matcher(&self, root: &Path) -> BuildResult<IgnoreMatcher> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in &self.patterns {
            let (bang, body) = match pattern.strip_prefix('!') {
                Some(body) => ("!", body),
                None => ("", pattern.as_str()),
            };
            let line = if body.starts_with("**") {
                format!("{bang}{body}")
            } else {
                format!("{bang}/{body}")
            };
            builder.add_line(None, &line)?;
        }
        Ok(IgnoreMatcher {
            gitignore: builder.build()?,
        })
    }
}

/// Compiled `IgnoreRules` for one context root.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    gitignore: Gitignore,
}

impl IgnoreMatcher {
    /// `relative` is `/`-separated and relative to the context root.
    pub fn is_ignored(&self, relative: &str, is_dir: bool) -> bool {
        self.gitignore
            .matched_path_or_any_parents(Path::new(relative), is_dir)
            .is_ignore()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    /// Relative to the context root, `/`-separated.
    pub path: String,
    pub size: u64,
    pub executable: bool,
    pub sha256: String,
}

/// Files that one copy step stages, plus their combined digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInput {
    pub digest: String,
    pub files: Vec<ContextFile>,
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    manifest: ContextFile,
    files: Vec<ContextFile>,
}

impl BuildContext {
    #[instrument(skip(rules))]
    pub fn scan(root: &Path, manifest: &str, rules: &IgnoreRules) -> BuildResult<Self> {
        if !root.is_dir() {
            return Err(BuildError::ContextNotFound(root.to_path_buf()));
        }

        let manifest_path = root.join(manifest);
        if !manifest_path.is_file() {
            return Err(BuildError::ManifestMissing(manifest_path));
        }

        let manifest = describe(root, manifest)?;
        let files = walk(root, rules.matcher(root)?)?;

        let total: u64 = files.iter().map(|f| f.size).sum();
        info!(
            "Scanned build context {} with {} files, total size: {} bytes",
            root.display(),
            files.len(),
            total
        );

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &ContextFile {
        &self.manifest
    }

    pub fn files(&self) -> &[ContextFile] {
        &self.files
    }

    pub fn manifest_input(&self) -> StagedInput {
        staged(vec![self.manifest.clone()])
    }

    pub fn source_input(&self) -> StagedInput {
        staged(self.files.clone())
    }

    /// Tar of `input`, re-reading each file and refusing to continue if the
    /// content no longer matches what was scanned.
    pub fn archive(&self, input: &StagedInput) -> BuildResult<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dirs = BTreeSet::new();
        for file in &input.files {
            let mut parts: Vec<&str> = file.path.split('/').collect();
            parts.pop();
            for depth in 1..=parts.len() {
                dirs.insert(parts[..depth].join("/"));
            }
        }
        for dir in &dirs {
            append_dir(&mut builder, dir)?;
        }

        for file in &input.files {
            let full = self.root.join(&file.path);
            let data = fs::read(&full).map_err(|e| BuildError::SourceStaging {
                path: full.clone(),
                reason: e.to_string(),
            })?;
            if sha256_hex(&data) != file.sha256 {
                return Err(BuildError::SourceStaging {
                    path: full,
                    reason: "file changed after the context was scanned".to_string(),
                });
            }
            let mode = if file.executable { 0o755 } else { 0o644 };
            append_file(&mut builder, &file.path, mode, &data)?;
        }

        Ok(builder.into_inner()?)
    }
}

/// Tar holding only the directory chain of `path`, e.g. `app/` for `/app`.
/// Uploading it at `/` creates the directory without running a shell.
pub fn directory_archive(path: &str) -> BuildResult<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    for depth in 1..=parts.len() {
        append_dir(&mut builder, &parts[..depth].join("/"))?;
    }
    Ok(builder.into_inner()?)
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn staged(files: Vec<ContextFile>) -> StagedInput {
    let mut hasher = Sha256::new();
    for file in &files {
        hasher.update(file.path.as_bytes());
        hasher.update([0u8, file.executable as u8, 0u8]);
        hasher.update(file.sha256.as_bytes());
        hasher.update(b"\n");
    }
    StagedInput {
        digest: format!("{:x}", hasher.finalize()),
        files,
    }
}

/// Regular files under `root` that survive `matcher`, in sorted path order.
/// Excluded directories are not descended into.
fn walk(root: &Path, matcher: IgnoreMatcher) -> BuildResult<Vec<ContextFile>> {
    let filter_root = root.to_path_buf();
    let walker = WalkBuilder::new(root)
        .ignore(false)
        .git_global(false)
        .git_ignore(false)
        .git_exclude(false)
        .hidden(false)
        .parents(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let Ok(relative) = relative_path(&filter_root, entry.path()) else {
                return true;
            };
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            let ignored = matcher.is_ignored(&relative, is_dir);
            if ignored {
                debug!("Ignoring {}", relative);
            }
            !ignored
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        match entry.file_type() {
            Some(t) if t.is_file() => {
                files.push(describe(root, &relative_path(root, entry.path())?)?);
            }
            Some(t) if t.is_dir() => {}
            _ => debug!("Skipping non-regular file {}", entry.path().display()),
        }
    }
    Ok(files)
}

fn describe(root: &Path, relative: &str) -> BuildResult<ContextFile> {
    let full = root.join(relative);
    let data = fs::read(&full).map_err(|e| BuildError::SourceStaging {
        path: full.clone(),
        reason: e.to_string(),
    })?;
    let metadata = fs::metadata(&full)?;

    #[cfg(unix)]
    let executable = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    };
    #[cfg(not(unix))]
    let executable = false;

    Ok(ContextFile {
        path: relative.to_string(),
        size: metadata.len(),
        executable,
        sha256: sha256_hex(&data),
    })
}

fn relative_path(root: &Path, path: &Path) -> BuildResult<String> {
    let relative = path.strip_prefix(root).map_err(|e| BuildError::SourceStaging {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn append_dir(builder: &mut tar::Builder<Vec<u8>>, path: &str) -> BuildResult<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_path(format!("{path}/"))?;
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    builder.append(&header, std::io::empty())?;
    Ok(())
}

fn append_file(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &str,
    mode: u32,
    data: &[u8],
) -> BuildResult<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_path(path)?;
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    builder.append(&header, data)?;
    Ok(())
}

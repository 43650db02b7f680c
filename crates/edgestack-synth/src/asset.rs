//! Docker image assets built from a local build context.
//!
//! The fingerprint covers every file under the context, walked in file name
//! order, so that an unchanged context always yields the same image tag and
//! therefore an identical template.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use edgestack_common::constants::{ASSET_EXCLUDES, BOOTSTRAP_QUALIFIER, DOCKERFILE};
use edgestack_common::error::{EdgestackError, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use crate::intrinsic;

/// A container image built from a directory at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerImageAsset {
    directory: PathBuf,
    fingerprint: String,
}

impl DockerImageAsset {
    /// Fingerprints the build context at `directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory has no `Dockerfile` or cannot be read.
    pub fn from_directory(directory: impl AsRef<Path>) -> Result<Self> {
        Self::from_directory_with_excludes(directory, &[])
    }

    /// Fingerprints the build context at `directory`, skipping `excludes`
    /// on top of [`ASSET_EXCLUDES`].
    ///
    /// Excluded paths are resolved against the working directory, the same
    /// way the synthesizer resolves its output directory and context file.
    /// Paths outside the build context are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory has no `Dockerfile` or cannot be read.
    pub fn from_directory_with_excludes(directory: impl AsRef<Path>, excludes: &[PathBuf]) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let dockerfile = directory.join(DOCKERFILE);
        if !dockerfile.is_file() {
            return Err(EdgestackError::NotFound {
                kind: "Dockerfile",
                id: dockerfile.display().to_string(),
            });
        }
        let fingerprint = fingerprint_directory(&directory, excludes)?;
        tracing::debug!(
            path = %directory.display(),
            %fingerprint,
            excludes = excludes.len(),
            "fingerprinted docker build context"
        );
        Ok(Self {
            directory,
            fingerprint,
        })
    }

    /// Hex SHA-256 fingerprint of the build context, used as the image tag.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Build context directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Bootstrap repository the image is pushed to, with pseudo-parameter placeholders.
    #[must_use]
    pub fn repository_name() -> String {
        format!("cdk-{BOOTSTRAP_QUALIFIER}-container-assets-${{AWS::AccountId}}-${{AWS::Region}}")
    }

    /// Full image URI as an `Fn::Sub` expression.
    #[must_use]
    pub fn image_uri(&self) -> Value {
        intrinsic::sub(&format!(
            "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}:{}",
            Self::repository_name(),
            self.fingerprint
        ))
    }
}

/// Computes the SHA-256 fingerprint of a directory tree.
///
/// Entries named in [`ASSET_EXCLUDES`] are skipped at any depth, and so are
/// the `excludes` paths that fall inside `root`. Symbolic links contribute
/// their target path rather than being followed.
///
/// # Errors
///
/// Returns an error if any entry cannot be read.
pub fn fingerprint_directory(root: &Path, excludes: &[PathBuf]) -> Result<String> {
    let excluded: Vec<PathBuf> = excludes.iter().filter_map(|p| relative_to(root, p)).collect();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(root, entry, &excluded));

    let mut hasher = Sha256::new();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let file_type = entry.file_type();
        let content = if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).map_err(|e| io_error(entry.path(), e))?;
            target.to_string_lossy().into_owned().into_bytes()
        } else if file_type.is_file() {
            fs::read(entry.path()).map_err(|e| io_error(entry.path(), e))?
        } else {
            continue;
        };
        hasher.update(relative_name(root, entry.path()).as_bytes());
        hasher.update([0u8]);
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(&content);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn is_excluded(root: &Path, entry: &DirEntry, excluded: &[PathBuf]) -> bool {
    if ASSET_EXCLUDES.iter().any(|name| entry.file_name() == OsStr::new(name)) {
        return true;
    }
    entry
        .path()
        .strip_prefix(root)
        .is_ok_and(|relative| excluded.iter().any(|p| p.as_path() == relative))
}

/// `path` relative to `root` when it lies strictly inside it.
fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = normalize(&std::path::absolute(root).ok()?);
    let path = normalize(&std::path::absolute(path).ok()?);
    path.strip_prefix(&root)
        .ok()
        .filter(|relative| !relative.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Drops `.` components and folds `..` lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(root: &Path, err: walkdir::Error) -> EdgestackError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop in build context"));
    EdgestackError::Io { path, source }
}

fn io_error(path: &Path, source: std::io::Error) -> EdgestackError {
    EdgestackError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("mkdir");
            }
            fs::write(path, content).expect("write");
        }
        dir
    }

    #[test]
    fn missing_dockerfile_is_rejected() {
        let dir = context_with(&[("server.mjs", "export {}")]);
        let err = DockerImageAsset::from_directory(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Dockerfile"), "got: {err}");
    }

    #[test]
    fn fingerprint_is_stable() {
        let dir = context_with(&[("Dockerfile", "FROM node:20"), ("src/app.ts", "listen(3000)")]);
        let a = DockerImageAsset::from_directory(dir.path()).expect("asset");
        let b = DockerImageAsset::from_directory(dir.path()).expect("asset");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_tracks_content_and_names() {
        let one = context_with(&[("Dockerfile", "FROM node:20"), ("a.txt", "x")]);
        let two = context_with(&[("Dockerfile", "FROM node:20"), ("a.txt", "y")]);
        let three = context_with(&[("Dockerfile", "FROM node:20"), ("b.txt", "x")]);
        let f1 = fingerprint_directory(one.path(), &[]).expect("f1");
        let f2 = fingerprint_directory(two.path(), &[]).expect("f2");
        let f3 = fingerprint_directory(three.path(), &[]).expect("f3");
        assert_ne!(f1, f2);
        assert_ne!(f1, f3);
    }

    #[test]
    fn excluded_directories_do_not_change_fingerprint() {
        let dir = context_with(&[("Dockerfile", "FROM node:20")]);
        let before = fingerprint_directory(dir.path(), &[]).expect("before");
        fs::create_dir_all(dir.path().join("target/debug")).expect("mkdir");
        fs::write(dir.path().join("target/debug/out"), "binary").expect("write");
        fs::create_dir_all(dir.path().join("edgestack.out")).expect("mkdir");
        fs::write(dir.path().join("edgestack.out/manifest.json"), "{}").expect("write");
        let after = fingerprint_directory(dir.path(), &[]).expect("after");
        assert_eq!(before, after);
    }

    #[test]
    fn image_uri_points_at_bootstrap_repository() {
        let dir = context_with(&[("Dockerfile", "FROM node:20")]);
        let asset = DockerImageAsset::from_directory(dir.path()).expect("asset");
        let uri = asset.image_uri();
        let sub = uri["Fn::Sub"].as_str().expect("sub string");
        assert!(sub.contains("cdk-hnb659fds-container-assets-${AWS::AccountId}-${AWS::Region}"));
        assert!(sub.ends_with(asset.fingerprint()));
    }

    #[test]
    fn excluded_names_are_skipped_at_depth() {
        let dir = context_with(&[("Dockerfile", "FROM node:20"), ("src/app.ts", "listen(3000)")]);
        let before = fingerprint_directory(dir.path(), &[]).expect("before");
        fs::create_dir_all(dir.path().join("src/node_modules/left-pad")).expect("mkdir");
        fs::write(dir.path().join("src/node_modules/left-pad/index.js"), "pad").expect("write");
        fs::create_dir_all(dir.path().join("src/.git")).expect("mkdir");
        fs::write(dir.path().join("src/.git/HEAD"), "ref").expect("write");
        let after = fingerprint_directory(dir.path(), &[]).expect("after");
        assert_eq!(before, after);

        fs::write(dir.path().join("src/util.ts"), "export {}").expect("write");
        assert_ne!(before, fingerprint_directory(dir.path(), &[]).expect("changed"));
    }

    #[test]
    fn extra_excludes_skip_output_paths_inside_the_context() {
        let dir = context_with(&[("Dockerfile", "FROM node:20")]);
        let out = dir.path().join("custom-out");
        let context = dir.path().join("lookups.json");
        let excludes = vec![out.clone(), context.clone()];
        let before = fingerprint_directory(dir.path(), &excludes).expect("before");

        fs::create_dir_all(&out).expect("mkdir");
        fs::write(out.join("Service.template.json"), "{}").expect("write");
        fs::write(&context, "{}").expect("write");
        let after = fingerprint_directory(dir.path(), &excludes).expect("after");
        assert_eq!(before, after);
        assert_ne!(before, fingerprint_directory(dir.path(), &[]).expect("unfiltered"));
    }

    #[test]
    fn excludes_outside_the_context_are_ignored() {
        let dir = context_with(&[("Dockerfile", "FROM node:20")]);
        let elsewhere = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            fingerprint_directory(dir.path(), &[elsewhere.path().to_path_buf()]).expect("with"),
            fingerprint_directory(dir.path(), &[]).expect("without")
        );
        assert_eq!(relative_to(dir.path(), dir.path()), None);
        assert_eq!(
            relative_to(dir.path(), &dir.path().join("a/../b/./c")),
            Some(PathBuf::from("b/c"))
        );
    }
}

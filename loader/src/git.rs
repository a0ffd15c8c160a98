//! Materializing pinned git sources on disk.

use std::error::Error;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Boxed error returned by remote caches.
pub type RemoteError = Box<dyn Error + Send + Sync>;

/// Provides local checkouts of remote repositories.
pub trait RemoteCache: Send + Sync {
    /// Returns the local path of `path` inside `remote` at `commit`,
    /// fetching it first if needed. With `update` set, an existing
    /// checkout is refreshed.
    fn get(&self, remote: &str, path: &Path, commit: &str, update: bool) -> Result<PathBuf, RemoteError>;
}

/// A [`RemoteCache`] that shells out to `git`.
///
/// Checkouts live under `root/<sha256(remote)>/<sha256(commit)>` and are
/// reused across runs.
#[derive(Debug)]
pub struct GitCache {
    root: PathBuf,
    lock: Mutex<()>,
}

impl GitCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the checkout of `remote` at `commit`.
    pub fn checkout_dir(&self, remote: &str, commit: &str) -> PathBuf {
        self.root.join(hex_digest(remote)).join(hex_digest(commit))
    }

    fn fetch(&self, remote: &str, commit: &str, dir: &Path) -> Result<(), RemoteError> {
        fs::create_dir_all(dir)?;
        run_git(dir, &["init", "-q"])?;
        run_git(dir, &["fetch", "-q", "--depth", "1", remote, commit])?;
        run_git(dir, &["checkout", "-q", "--force", "FETCH_HEAD"])?;
        Ok(())
    }
}

impl RemoteCache for GitCache {
    fn get(&self, remote: &str, path: &Path, commit: &str, update: bool) -> Result<PathBuf, RemoteError> {
        let _guard = self.lock.lock();
        let dir = self.checkout_dir(remote, commit);
        let ready = dir.join(".git").is_dir();
        if ready && !update {
            debug!(remote, commit, dir = %dir.display(), "reusing git checkout");
        } else {
            info!(remote, commit, dir = %dir.display(), "fetching git source");
            if let Err(err) = self.fetch(remote, commit, &dir) {
                if !ready {
                    let _ = fs::remove_dir_all(&dir);
                }
                return Err(err);
            }
        }
        let target = dir.join(path);
        if !target.exists() {
            return Err(format!("{} does not exist at {commit}", path.display()).into());
        }
        Ok(target)
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<(), RemoteError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(format!("git {} failed: {}", args.join(" "), stderr.trim()).into())
}

fn hex_digest(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_dir_is_stable() {
        let cache = GitCache::new("/cache");
        let a = cache.checkout_dir("https://example.com/a.git", "main");
        let b = cache.checkout_dir("https://example.com/a.git", "main");
        assert_eq!(a, b);
        assert_ne!(a, cache.checkout_dir("https://example.com/a.git", "v2"));
        assert!(a.starts_with("/cache"));
        assert_eq!(a.file_name().unwrap().len(), 64);
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=tooltree", "-c", "user.email=tooltree@example.com"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn commit_file(repo: &Path, relative: &str, contents: &str) {
        let path = repo.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        git(repo, &["add", "-A"]);
        git(repo, &["commit", "-q", "-m", contents]);
    }

    #[test]
    fn test_checkout_reused_until_update() {
        if Command::new("git").arg("--version").output().is_err() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let repo = temp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        git(&repo, &["init", "-q"]);
        git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        commit_file(&repo, "tools/build.yml", "desc: first\n");

        let cache = GitCache::new(temp.path().join("cache"));
        let remote = repo.to_str().unwrap();
        let first = cache.get(remote, Path::new("tools"), "main", false).unwrap();
        assert_eq!(fs::read_to_string(first.join("build.yml")).unwrap(), "desc: first\n");
        let marker = cache.checkout_dir(remote, "main").join("marker");
        fs::write(&marker, "").unwrap();

        commit_file(&repo, "tools/build.yml", "desc: second\n");
        let reused = cache.get(remote, Path::new("tools"), "main", false).unwrap();
        assert_eq!(reused, first);
        assert!(marker.exists());
        assert_eq!(fs::read_to_string(reused.join("build.yml")).unwrap(), "desc: first\n");

        let refreshed = cache.get(remote, Path::new("tools"), "main", true).unwrap();
        assert_eq!(refreshed, first);
        assert_eq!(fs::read_to_string(refreshed.join("build.yml")).unwrap(), "desc: second\n");
    }

    #[test]
    fn test_missing_path_in_checkout_fails() {
        if Command::new("git").arg("--version").output().is_err() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let repo = temp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        git(&repo, &["init", "-q"]);
        git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        commit_file(&repo, "tools/build.yml", "desc: first\n");

        let cache = GitCache::new(temp.path().join("cache"));
        let err = cache
            .get(repo.to_str().unwrap(), Path::new("other"), "main", false)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_missing_remote_fails() {
        let temp = tempfile::tempdir().unwrap();
        let cache = GitCache::new(temp.path());
        let missing = temp.path().join("no-such-repo");
        let result = cache.get(missing.to_str().unwrap(), Path::new("tools"), "main", false);
        assert!(result.is_err());
        let dir = cache.checkout_dir(missing.to_str().unwrap(), "main");
        assert!(!dir.exists());
    }
}

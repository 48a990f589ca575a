use super::{Check, CheckContext, CheckError, CheckResult};
use async_trait::async_trait;
use git2::{Repository, Status, StatusOptions};
use scoring::Measurement;
use std::path::{Path, PathBuf};

const SHOWN_PATHS: usize = 5;

/// Working tree must have no uncommitted changes.
pub struct GitCleanCheck {
    pub id: String,
    pub path: Option<PathBuf>,
    pub allow_untracked: bool,
}

/// Paths with uncommitted changes, sorted.
pub fn dirty_paths(repo_path: &Path, allow_untracked: bool) -> CheckResult<Vec<String>> {
    let repo = Repository::discover(repo_path)?;

    let mut options = StatusOptions::new();
    options
        .include_untracked(!allow_untracked)
        .recurse_untracked_dirs(!allow_untracked)
        .include_ignored(false);

    let statuses = repo.statuses(Some(&mut options))?;
    let mut dirty: Vec<String> = statuses
        .iter()
        .filter(|entry| {
            let status = entry.status();
            if status.is_ignored() || status == Status::CURRENT {
                return false;
            }
            !(allow_untracked && status == Status::WT_NEW)
        })
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect();

    dirty.sort();
    Ok(dirty)
}

#[async_trait]
impl Check for GitCleanCheck {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let repo_path = ctx.resolve_opt(self.path.as_ref());
        let allow_untracked = self.allow_untracked;

        let dirty = tokio::task::spawn_blocking(move || dirty_paths(&repo_path, allow_untracked))
            .await
            .map_err(|e| CheckError::InvalidSpec {
                message: format!("git status task failed: {e}"),
            })??;

        if dirty.is_empty() {
            return Ok(Measurement::pass("working tree clean").with_metric("dirty", 0.0));
        }

        let mut shown: Vec<&str> = dirty.iter().take(SHOWN_PATHS).map(String::as_str).collect();
        if dirty.len() > SHOWN_PATHS {
            shown.push("...");
        }

        Ok(Measurement::fail(format!(
            "{} uncommitted paths: {}",
            dirty.len(),
            shown.join(", ")
        ))
        .with_metric("dirty", dirty.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn commit_all(repo: &Repository) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
    }

    #[tokio::test]
    async fn test_clean_and_dirty_tree() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        commit_all(&repo);

        let ctx = CheckContext::new(dir.path());
        let check = GitCleanCheck {
            id: "clean".to_string(),
            path: None,
            allow_untracked: false,
        };
        let m = check.run(&ctx).await.unwrap();
        assert!(m.passed, "{}", m.details);

        std::fs::write(dir.path().join("README.md"), "changed").unwrap();
        std::fs::write(dir.path().join("scratch.txt"), "tmp").unwrap();

        let m = check.run(&ctx).await.unwrap();
        assert!(!m.passed);
        assert_eq!(m.details, "2 uncommitted paths: README.md, scratch.txt");

        let lenient = GitCleanCheck {
            allow_untracked: true,
            ..check
        };
        let m = lenient.run(&ctx).await.unwrap();
        assert_eq!(m.details, "1 uncommitted paths: README.md");
    }

    #[tokio::test]
    async fn test_not_a_repository() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("plain");
        std::fs::create_dir_all(&nested).unwrap();
        let ctx = CheckContext::new(&nested);
        let check = GitCleanCheck {
            id: "clean".to_string(),
            path: None,
            allow_untracked: false,
        };
        // tempdirs normally live outside any repository
        if Repository::discover(&nested).is_err() {
            assert!(matches!(check.run(&ctx).await, Err(CheckError::Git(_))));
        }
    }
}

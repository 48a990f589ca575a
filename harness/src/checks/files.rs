use super::{Check, CheckContext, CheckError, CheckResult};
use async_trait::async_trait;
use regex::Regex;
use scoring::Measurement;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct FileExists {
    id: String,
    path: PathBuf,
}

impl FileExists {
    pub fn new(id: impl Into<String>, path: PathBuf) -> Self {
        Self {
            id: id.into(),
            path,
        }
    }
}

#[async_trait]
impl Check for FileExists {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let path = ctx.resolve(&self.path);
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(Measurement::pass(format!("{} exists", self.path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Ok(Measurement::fail(format!("{} is missing", self.path.display())))
            }
            Err(source) => Err(CheckError::Io { path, source }),
        }
    }
}

/// Regex search over a single file.
///
/// With `absent` the check inverts: any match is a failure. A missing file
/// fails in both modes.
pub struct FileContains {
    id: String,
    path: PathBuf,
    pattern: Regex,
    absent: bool,
}

impl FileContains {
    pub fn new(
        id: impl Into<String>,
        path: PathBuf,
        pattern: &str,
        absent: bool,
    ) -> CheckResult<Self> {
        Ok(Self {
            id: id.into(),
            path,
            pattern: Regex::new(pattern)?,
            absent,
        })
    }
}

#[async_trait]
impl Check for FileContains {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ctx: &CheckContext) -> CheckResult<Measurement> {
        let path = ctx.resolve(&self.path);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Measurement::fail(format!(
                    "{} is missing",
                    self.path.display()
                )));
            }
            Err(source) => return Err(CheckError::Io { path, source }),
        };

        let matches = self.pattern.find_iter(&content).count();
        let first_line = self
            .pattern
            .find(&content)
            .map(|m| content[..m.start()].matches('\n').count() + 1);

        let measurement = match (self.absent, first_line) {
            (false, Some(line)) => Measurement::pass(format!(
                "{} matches of /{}/ in {}, first on line {}",
                matches,
                self.pattern.as_str(),
                self.path.display(),
                line
            )),
            (false, None) => Measurement::fail(format!(
                "/{}/ not found in {}",
                self.pattern.as_str(),
                self.path.display()
            )),
            (true, Some(line)) => Measurement::fail(format!(
                "forbidden /{}/ found {} times in {}, first on line {}",
                self.pattern.as_str(),
                matches,
                self.path.display(),
                line
            )),
            (true, None) => Measurement::pass(format!(
                "/{}/ absent from {}",
                self.pattern.as_str(),
                self.path.display()
            )),
        };

        Ok(measurement.with_metric("matches", matches as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_exists() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# hi").unwrap();
        let ctx = CheckContext::new(dir.path());

        let present = FileExists::new("readme", "README.md".into());
        assert!(present.run(&ctx).await.unwrap().passed);

        let absent = FileExists::new("license", "LICENSE".into());
        let m = absent.run(&ctx).await.unwrap();
        assert!(!m.passed);
        assert_eq!(m.details, "LICENSE is missing");
    }

    #[tokio::test]
    async fn test_file_contains_reports_first_line() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.py"),
            "DEBUG = False\nSESSION_COOKIE_SECURE = True\nCSRF = True\n",
        )
        .unwrap();
        let ctx = CheckContext::new(dir.path());

        let check = FileContains::new(
            "cookies",
            "settings.py".into(),
            r"SESSION_COOKIE_SECURE\s*=\s*True",
            false,
        )
        .unwrap();
        let m = check.run(&ctx).await.unwrap();
        assert!(m.passed);
        assert!(m.details.contains("first on line 2"), "{}", m.details);
        assert_eq!(m.metrics.get("matches"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_file_contains_absent_mode() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.py"),
            "API_KEY = \"sk-live-123\"\nTOKEN = \"sk-live-456\"\n",
        )
        .unwrap();
        let ctx = CheckContext::new(dir.path());

        let check = FileContains::new("no-keys", "config.py".into(), r"sk-live-\d+", true).unwrap();
        let m = check.run(&ctx).await.unwrap();
        assert!(!m.passed);
        assert!(m.details.contains("found 2 times"), "{}", m.details);
        assert!(m.details.contains("first on line 1"), "{}", m.details);

        let check = FileContains::new("no-debug", "config.py".into(), "DEBUG = True", true).unwrap();
        assert!(check.run(&ctx).await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_file_contains_missing_file_fails() {
        let dir = tempdir().unwrap();
        let ctx = CheckContext::new(dir.path());
        for absent in [false, true] {
            let check = FileContains::new("x", "nope.txt".into(), "x", absent).unwrap();
            let m = check.run(&ctx).await.unwrap();
            assert!(!m.passed);
            assert_eq!(m.details, "nope.txt is missing");
        }
    }
}

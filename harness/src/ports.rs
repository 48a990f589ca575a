//! Port inventory from source and configuration files.
//!
//! A fixed bank of patterns, ordered from most to least specific, picks up
//! port numbers in the places they are usually declared: compose mappings,
//! container manifests, environment fallbacks, proxy targets, listen calls,
//! `*_port` assignments and `host:port` authorities. When several patterns
//! hit the same port on one line, only the most specific one is kept.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid glob '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Scan root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ScanResult<T> = Result<T, ScanError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    ComposeMapping,
    ContainerExpose,
    EnvDefault,
    ProxyTarget,
    Listen,
    Assignment,
    UrlAuthority,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PortKind::ComposeMapping => "compose mapping",
            PortKind::ContainerExpose => "container port",
            PortKind::EnvDefault => "env default",
            PortKind::ProxyTarget => "proxy target",
            PortKind::Listen => "listen",
            PortKind::Assignment => "assignment",
            PortKind::UrlAuthority => "host:port",
        };
        f.write_str(label)
    }
}

struct PortPattern {
    kind: PortKind,
    regex: Regex,
}

static PATTERNS: Lazy<Vec<PortPattern>> = Lazy::new(|| {
    let bank: &[(PortKind, &str)] = &[
        (
            PortKind::ComposeMapping,
            r#"^\s*-\s*["']?(?:[\d.]+:)?(\d{1,5}):(\d{1,5})(?:/(?:tcp|udp))?["']?\s*$"#,
        ),
        (PortKind::ContainerExpose, r"\bEXPOSE\s+(\d{1,5})\b"),
        (
            PortKind::ContainerExpose,
            r"\b(?:containerPort|hostPort|targetPort|published)\s*:\s*(\d{1,5})\b",
        ),
        (PortKind::EnvDefault, r"process\.env\.\w*PORT\s*\|\|\s*(\d{1,5})\b"),
        (
            PortKind::EnvDefault,
            r#"(?:environ\.get|getenv)\(\s*["']\w*PORT["']\s*,\s*["']?(\d{1,5})\b"#,
        ),
        (PortKind::EnvDefault, r"\$\{\w*PORT:-(\d{1,5})\}"),
        (
            PortKind::ProxyTarget,
            r"\bproxy_pass\s+https?://[^\s:;/]+:(\d{1,5})\b",
        ),
        (PortKind::ProxyTarget, r"^\s*server\s+[^\s:;]+:(\d{1,5})\b"),
        (PortKind::Listen, r"^\s*listen\s+(?:[\d.]+:|\[::\]:)?(\d{1,5})\b"),
        (PortKind::Listen, r"\.listen\(\s*(\d{1,5})\b"),
        (PortKind::Listen, r"\.run\([^)]*\bport\s*=\s*(\d{1,5})\b"),
        (
            PortKind::Listen,
            r#"\bbind\(\s*\(?\s*["'][^"']*["']\s*,\s*(\d{1,5})\b"#,
        ),
        (
            PortKind::Listen,
            r#"\bbind\(\s*["'][^"':]*:(\d{1,5})["']"#,
        ),
        (
            PortKind::Assignment,
            r#"(?i)\b(?:[a-z]+_)?port\s*[:=]\s*["']?(\d{1,5})\b"#,
        ),
        (
            PortKind::UrlAuthority,
            r"\b(?:localhost|127\.0\.0\.1|0\.0\.0\.0|(?:\d{1,3}\.){3}\d{1,3}):(\d{1,5})\b",
        ),
        (PortKind::UrlAuthority, r"\bhttps?://[A-Za-z0-9.-]+:(\d{1,5})\b"),
    ];

    bank.iter()
        .map(|(kind, pattern)| PortPattern {
            kind: *kind,
            regex: Regex::new(pattern).expect("port pattern bank must compile"),
        })
        .collect()
});

const DEFAULT_INCLUDE: &[&str] = &[
    "**/*.py",
    "**/*.js",
    "**/*.ts",
    "**/*.jsx",
    "**/*.tsx",
    "**/*.rs",
    "**/*.go",
    "**/*.toml",
    "**/*.yaml",
    "**/*.yml",
    "**/*.json",
    "**/*.ini",
    "**/*.cfg",
    "**/*.conf",
    "**/*.sh",
    "**/*.env",
    "**/.env",
    "**/Dockerfile",
];

const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    "venv",
    ".venv",
    "dist",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortHit {
    pub line: usize,
    pub column: usize,
    pub port: u16,
    pub kind: PortKind,
}

/// Find ports in a block of text. Lines and columns are 1-based; columns
/// count characters, not bytes.
pub fn scan_text(text: &str) -> Vec<PortHit> {
    let mut hits = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let mut seen = BTreeSet::new();

        for pattern in PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(line) {
                for group in caps.iter().skip(1).flatten() {
                    let Ok(port) = group.as_str().parse::<u16>() else {
                        continue;
                    };
                    if port == 0 || !seen.insert(port) {
                        continue;
                    }
                    hits.push(PortHit {
                        line: index + 1,
                        column: line[..group.start()].chars().count() + 1,
                        port,
                        kind: pattern.kind,
                    });
                }
            }
        }
    }

    hits.sort_by_key(|h| (h.line, h.column));
    hits
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLocation {
    pub path: PathBuf,
    pub line: usize,
    pub kind: PortKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortInventory {
    pub files_scanned: usize,
    pub ports: BTreeMap<u16, Vec<PortLocation>>,
}

impl PortInventory {
    pub fn contains(&self, port: u16) -> bool {
        self.ports.contains_key(&port)
    }

    pub fn locations(&self, port: u16) -> &[PortLocation] {
        self.ports.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ports declared in more than one file.
    pub fn conflicts(&self) -> Vec<(u16, Vec<&Path>)> {
        self.ports
            .iter()
            .filter_map(|(port, locations)| {
                let files: BTreeSet<&Path> = locations.iter().map(|l| l.path.as_path()).collect();
                (files.len() > 1).then(|| (*port, files.into_iter().collect()))
            })
            .collect()
    }

    pub fn to_json(&self) -> ScanResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn record(&mut self, path: &Path, hits: Vec<PortHit>) {
        for hit in hits {
            self.ports.entry(hit.port).or_default().push(PortLocation {
                path: path.to_path_buf(),
                line: hit.line,
                kind: hit.kind,
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortScanner {
    pub root: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_bytes: u64,
}

impl PortScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect(),
            exclude: Vec::new(),
            max_file_bytes: 1024 * 1024,
        }
    }

    /// Replace the default include globs. An empty list keeps the defaults.
    pub fn with_include(mut self, include: Vec<String>) -> Self {
        if !include.is_empty() {
            self.include = include;
        }
        self
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn scan(&self) -> ScanResult<PortInventory> {
        if !self.root.is_dir() {
            return Err(ScanError::NotADirectory(self.root.clone()));
        }

        let excludes = self
            .exclude
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|source| ScanError::Glob {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<ScanResult<Vec<_>>>()?;

        let escaped_root = glob::Pattern::escape(&self.root.to_string_lossy());
        let mut files = BTreeSet::new();
        for include in &self.include {
            let pattern = format!("{}/{}", escaped_root, include);
            let paths = glob::glob(&pattern).map_err(|source| ScanError::Glob {
                pattern: include.clone(),
                source,
            })?;
            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => {
                        files.insert(path);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Skipping unreadable path: {}", e),
                }
            }
        }

        let mut inventory = PortInventory::default();
        for path in files {
            let relative = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
            if self.is_excluded(&relative, &excludes) {
                continue;
            }

            let Some(text) = self.read_text(&path) else {
                continue;
            };
            inventory.files_scanned += 1;
            inventory.record(&relative, scan_text(&text));
        }

        info!(
            root = %self.root.display(),
            files = inventory.files_scanned,
            ports = inventory.ports.len(),
            "Port scan complete"
        );
        Ok(inventory)
    }

    fn is_excluded(&self, relative: &Path, excludes: &[glob::Pattern]) -> bool {
        let in_skipped_dir = relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| SKIPPED_DIRS.contains(&name))
        });
        in_skipped_dir || excludes.iter().any(|p| p.matches_path(relative))
    }

    fn read_text(&self, path: &Path) -> Option<String> {
        let metadata = std::fs::metadata(path).ok()?;
        if metadata.len() > self.max_file_bytes {
            debug!(path = %path.display(), size = metadata.len(), "Skipping large file");
            return None;
        }
        let bytes = std::fs::read(path).ok()?;
        String::from_utf8(bytes).ok()
    }
}

//! pip requirements manifest: validation and install.
//!
//! The file is checked before pip runs so that a missing or malformed
//! manifest fails the requirements step with a line number, instead of
//! whatever pip prints half way through resolving.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use thiserror::Error;

use super::venv::{Activation, Venv};
use crate::error::ProvisionError;
use crate::process::run_captured;

/// Nested `-r` includes deeper than this are treated as a cycle.
const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum RequirementsError {
    #[error("requirements file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}:{line}: {reason}: {content}")]
    Syntax {
        path: PathBuf,
        line: usize,
        content: String,
        reason: String,
    },

    #[error("{path}: includes nested deeper than {} levels", MAX_INCLUDE_DEPTH)]
    IncludeDepth { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Requirements,
    Constraints,
}

/// A named requirement: `name[extras] specifiers ; marker` or `name @ url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub specifiers: Vec<String>,
    pub url: Option<String>,
    pub marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementLine {
    Package(Requirement),
    /// Bare URL or local path (`./pkg`, `https://.../x.whl`).
    Direct(String),
    Editable(String),
    Include { kind: IncludeKind, target: String },
    /// Global pip option such as `--index-url`.
    Option(String),
}

impl RequirementLine {
    /// True for lines that make pip install something.
    pub fn installs(&self) -> bool {
        matches!(
            self,
            RequirementLine::Package(_) | RequirementLine::Direct(_) | RequirementLine::Editable(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct RequirementsFile {
    pub path: PathBuf,
    /// (1-based line number, parsed line)
    pub lines: Vec<(usize, RequirementLine)>,
    /// Parsed `-r` includes, in order of appearance.
    pub includes: Vec<RequirementsFile>,
    content: String,
}

impl RequirementsFile {
    pub fn packages(&self) -> impl Iterator<Item = &Requirement> {
        self.lines.iter().filter_map(|(_, l)| match l {
            RequirementLine::Package(r) => Some(r),
            _ => None,
        })
    }

    /// Whether this file or any include would install at least one package.
    pub fn has_installables(&self) -> bool {
        self.lines.iter().any(|(_, l)| l.installs())
            || self.includes.iter().any(|i| i.has_installables())
    }

    /// SHA-256 over this file and all includes, in order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        self.feed(&mut hasher);
        hex::encode(hasher.finalize())
    }

    fn feed(&self, hasher: &mut Sha256) {
        hasher.update(self.content.as_bytes());
        for inc in &self.includes {
            hasher.update(b"\0");
            inc.feed(hasher);
        }
    }
}

/// Read and validate `path`, following `-r`/`-c` includes.
pub fn load(path: &Path) -> Result<RequirementsFile, RequirementsError> {
    load_at_depth(path, 0)
}

fn load_at_depth(path: &Path, depth: usize) -> Result<RequirementsFile, RequirementsError> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(RequirementsError::IncludeDepth {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(RequirementsError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| RequirementsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let lines = parse(&content, path)?;

    let base = path.parent().unwrap_or(Path::new("."));
    let mut includes = Vec::new();
    for (_, line) in &lines {
        if let RequirementLine::Include { target, .. } = line {
            if target.contains("://") {
                continue;
            }
            includes.push(load_at_depth(&base.join(target), depth + 1)?);
        }
    }

    Ok(RequirementsFile {
        path: path.to_path_buf(),
        lines,
        includes,
        content,
    })
}

/// Validate requirements text. `path` is only used for error messages.
pub fn parse(content: &str, path: &Path) -> Result<Vec<(usize, RequirementLine)>, RequirementsError> {
    let mut out = Vec::new();
    for (line_no, logical) in logical_lines(content) {
        let text = strip_comment(&logical);
        if text.is_empty() {
            continue;
        }
        let parsed = parse_line(text).map_err(|reason| RequirementsError::Syntax {
            path: path.to_path_buf(),
            line: line_no,
            content: text.to_string(),
            reason,
        })?;
        out.push((line_no, parsed));
    }
    Ok(out)
}

/// Join `\`-continued physical lines. Numbers refer to the first physical line.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (idx, raw) in content.lines().enumerate() {
        let (start, mut buf) = pending.take().unwrap_or((idx + 1, String::new()));
        if let Some(stripped) = raw.strip_suffix('\\') {
            buf.push_str(stripped);
            pending = Some((start, buf));
        } else {
            buf.push_str(raw);
            out.push((start, buf));
        }
    }
    if let Some(last) = pending {
        out.push(last);
    }
    out
}

/// `#` at line start or after whitespace begins a comment; `#` inside a URL
/// fragment (`...#egg=name`) does not.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return line[..i].trim();
        }
    }
    line.trim()
}

fn parse_line(text: &str) -> Result<RequirementLine, String> {
    if text.starts_with('-') {
        return parse_option(text);
    }
    if is_direct_reference(text) {
        return Ok(RequirementLine::Direct(text.to_string()));
    }
    parse_requirement(text).map(RequirementLine::Package)
}

fn is_direct_reference(text: &str) -> bool {
    if text.starts_with('.') || text.starts_with('/') {
        return true;
    }
    let first = text.split_whitespace().next().unwrap_or(text);
    first.contains("://")
        || (!text.contains('@')
            && (first.ends_with(".whl") || first.ends_with(".tar.gz") || first.ends_with(".zip")))
}

/// Options that consume a value, as `--opt value`, `--opt=value` or `-ovalue`.
const VALUE_OPTIONS: &[(&str, Option<&str>)] = &[
    ("--index-url", Some("-i")),
    ("--extra-index-url", None),
    ("--find-links", Some("-f")),
    ("--trusted-host", None),
    ("--only-binary", None),
    ("--no-binary", None),
    ("--use-feature", None),
    ("--global-option", None),
    ("--config-settings", None),
];

const FLAG_OPTIONS: &[&str] = &["--no-index", "--pre", "--prefer-binary", "--require-hashes"];

fn parse_option(text: &str) -> Result<RequirementLine, String> {
    let (flag, value) = split_option(text);

    match flag {
        "-r" | "--requirement" | "-c" | "--constraint" => {
            let kind = if matches!(flag, "-c" | "--constraint") {
                IncludeKind::Constraints
            } else {
                IncludeKind::Requirements
            };
            let target = value.ok_or_else(|| format!("'{}' requires a file argument", flag))?;
            return Ok(RequirementLine::Include {
                kind,
                target: target.to_string(),
            });
        }
        "-e" | "--editable" => {
            let target = value.ok_or_else(|| format!("'{}' requires a path or URL", flag))?;
            return Ok(RequirementLine::Editable(target.to_string()));
        }
        _ => {}
    }

    if FLAG_OPTIONS.contains(&flag) {
        if value.is_some() {
            return Err(format!("'{}' does not take a value", flag));
        }
        return Ok(RequirementLine::Option(text.to_string()));
    }
    if VALUE_OPTIONS
        .iter()
        .any(|(long, short)| *long == flag || *short == Some(flag))
    {
        if value.is_none() {
            return Err(format!("'{}' requires a value", flag));
        }
        return Ok(RequirementLine::Option(text.to_string()));
    }
    Err(format!("unknown option '{}'", flag))
}

/// Split `--opt=value`, `--opt value`, `-ovalue` or `-o value`.
fn split_option(text: &str) -> (&str, Option<&str>) {
    if text.starts_with("--") {
        let end = text
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(text.len());
        let rest = &text[end..];
        let rest = rest.strip_prefix('=').unwrap_or(rest);
        return (&text[..end], non_empty(rest));
    }
    // Short option: `-r file`, `-rfile`
    let flag_end = text.char_indices().nth(2).map_or(text.len(), |(i, _)| i);
    let (flag, rest) = text.split_at(flag_end);
    (flag, non_empty(rest))
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[([^\]]*)\])?\s*(.*)$")
            .expect("valid regex")
    })
}

fn specifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(===|==|!=|~=|<=|>=|<|>)\s*([A-Za-z0-9.*+!_-]+)$").expect("valid regex")
    })
}

fn extra_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("valid regex"))
}

/// Options pip accepts after a requirement on the same line.
const PER_REQUIREMENT_OPTIONS: &[&str] = &["--hash", "--config-settings", "--global-option"];

/// Split `pkg==1.0 --hash=sha256:...` at the first whitespace-preceded `--`.
fn split_trailing_options(text: &str) -> (&str, Option<&str>) {
    let idx = text
        .match_indices("--")
        .map(|(i, _)| i)
        .find(|&i| text[..i].ends_with(char::is_whitespace));
    match idx {
        Some(i) => (text[..i].trim_end(), Some(&text[i..])),
        None => (text, None),
    }
}

fn check_trailing_options(options: &str) -> Result<(), String> {
    let mut tokens = options.split_whitespace();
    while let Some(token) = tokens.next() {
        if !token.starts_with("--") {
            return Err(format!("unexpected token '{}'", token));
        }
        let (flag, inline) = match token.split_once('=') {
            Some((flag, value)) => (flag, Some(value)),
            None => (token, None),
        };
        if !PER_REQUIREMENT_OPTIONS.contains(&flag) {
            return Err(format!("unsupported per-requirement option '{}'", flag));
        }
        let value = match inline {
            Some(value) => value,
            None => tokens
                .next()
                .ok_or_else(|| format!("option '{}' requires a value", flag))?,
        };
        if value.is_empty() {
            return Err(format!("option '{}' requires a value", flag));
        }
        if flag == "--hash" && !value.contains(':') {
            return Err(format!("hash '{}' must be algorithm:digest", value));
        }
    }
    Ok(())
}

fn parse_requirement(text: &str) -> Result<Requirement, String> {
    let (body, options) = split_trailing_options(text);
    if let Some(options) = options {
        check_trailing_options(options)?;
    }

    let (spec, marker) = match body.split_once(';') {
        Some((spec, marker)) => {
            let marker = marker.trim();
            if marker.is_empty() {
                return Err("empty environment marker after ';'".to_string());
            }
            (spec.trim(), Some(marker.to_string()))
        }
        None => (body, None),
    };

    let caps = name_re()
        .captures(spec)
        .ok_or_else(|| "invalid project name".to_string())?;
    let name = caps[1].to_string();

    let extras = match caps.get(2) {
        Some(m) => m
            .as_str()
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| {
                if extra_re().is_match(e) {
                    Ok(e.to_string())
                } else {
                    Err(format!("invalid extra '{}'", e))
                }
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let rest = caps.get(3).map_or("", |m| m.as_str()).trim();
    if let Some(url) = rest.strip_prefix('@') {
        let url = url.trim();
        if url.is_empty() {
            return Err("missing URL after '@'".to_string());
        }
        return Ok(Requirement {
            name,
            extras,
            specifiers: Vec::new(),
            url: Some(url.to_string()),
            marker,
        });
    }

    let rest = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .unwrap_or(rest);
    let mut specifiers = Vec::new();
    if !rest.is_empty() {
        for part in rest.split(',') {
            let part = part.trim();
            let caps = specifier_re()
                .captures(part)
                .ok_or_else(|| format!("invalid version specifier '{}'", part))?;
            specifiers.push(format!("{}{}", &caps[1], &caps[2]));
        }
    }

    Ok(Requirement {
        name,
        extras,
        specifiers,
        url: None,
        marker,
    })
}

/// `python -m pip install -r <requirements>` inside the venv.
pub fn install(
    venv: &Venv,
    activation: &Activation,
    requirements: &RequirementsFile,
) -> Result<(), ProvisionError> {
    let mut cmd = Command::new(venv.python());
    cmd.args(["-m", "pip", "install", "--disable-pip-version-check", "-r"])
        .arg(&requirements.path);
    activation.apply(&mut cmd);
    run_captured(&mut cmd)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(content: &str) -> Vec<RequirementLine> {
        parse(content, Path::new("requirements.txt"))
            .unwrap()
            .into_iter()
            .map(|(_, l)| l)
            .collect()
    }

    fn syntax_line(content: &str) -> usize {
        match parse(content, Path::new("requirements.txt")).unwrap_err() {
            RequirementsError::Syntax { line, .. } => line,
            other => panic!("expected syntax error, got {other}"),
        }
    }

    #[test]
    fn test_plain_names_and_specifiers() {
        let lines = parse_ok("yt-dlp\npika>=1.3,<2\npython-dotenv == 1.0.1\nrequests[socks, security]~=2.31\n");
        assert_eq!(lines.len(), 4);
        match &lines[1] {
            RequirementLine::Package(r) => {
                assert_eq!(r.name, "pika");
                assert_eq!(r.specifiers, vec![">=1.3", "<2"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &lines[3] {
            RequirementLine::Package(r) => {
                assert_eq!(r.extras, vec!["socks", "security"]);
                assert_eq!(r.specifiers, vec!["~=2.31"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_markers_urls_and_hashes() {
        let lines = parse_ok(
            "colorama; sys_platform == 'win32'\n\
             mypkg @ https://example.com/mypkg-1.0.whl\n\
             https://example.com/other.tar.gz#egg=other\n\
             six==1.16.0 --hash=sha256:abcd\n\
             pkg==1.0\t--hash=sha256:abcd --hash sha256:ef01\n\
             pkg --config-settings=key=val\n\
             pkg==1.0 --global-option=build_ext\n",
        );
        assert_eq!(lines.len(), 7);
        match &lines[0] {
            RequirementLine::Package(r) => {
                assert_eq!(r.marker.as_deref(), Some("sys_platform == 'win32'"))
            }
            other => panic!("unexpected {other:?}"),
        }
        match &lines[1] {
            RequirementLine::Package(r) => {
                assert_eq!(r.url.as_deref(), Some("https://example.com/mypkg-1.0.whl"))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(lines[2], RequirementLine::Direct(_)));
        assert!(matches!(lines[3], RequirementLine::Package(_)));
        match &lines[4] {
            RequirementLine::Package(r) => {
                assert_eq!(r.name, "pkg");
                assert_eq!(r.specifiers, vec!["==1.0"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &lines[5] {
            RequirementLine::Package(r) => assert!(r.specifiers.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(lines[6], RequirementLine::Package(_)));
    }

    #[test]
    fn test_bad_per_requirement_options() {
        assert_eq!(syntax_line("six==1.16.0 --hash=abcd\n"), 1);
        assert_eq!(syntax_line("six --no-binary=:all:\n"), 1);
        assert_eq!(syntax_line("six --global-option\n"), 1);
        assert_eq!(syntax_line("six --hash=sha256:ab stray\n"), 1);
    }

    #[test]
    fn test_comments_continuations_and_options() {
        let lines = parse_ok(
            "# header\n\n--index-url https://pypi.org/simple\n-e ./local\nrequests \\\n    >=2.0  # inline\n--pre\n",
        );
        assert_eq!(lines.len(), 4);
        assert!(matches!(lines[0], RequirementLine::Option(_)));
        assert_eq!(lines[1], RequirementLine::Editable("./local".to_string()));
        match &lines[2] {
            RequirementLine::Package(r) => assert_eq!(r.specifiers, vec![">=2.0"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_syntax_errors_report_line() {
        assert_eq!(syntax_line("requests\n==2.0\n"), 2);
        assert_eq!(syntax_line("ok\n\nrequests >>2\n"), 3);
        assert_eq!(syntax_line("--bogus-flag\n"), 1);
        assert_eq!(syntax_line("-r\n"), 1);
        assert_eq!(syntax_line("pkg;\n"), 1);
        assert_eq!(syntax_line("pkg[bad extra]\n"), 1);
        assert_eq!(syntax_line("--pre=yes\n"), 1);
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load(&tmp.path().join("requirements.txt")).unwrap_err();
        assert!(matches!(err, RequirementsError::Missing(_)));
    }

    #[test]
    fn test_includes_are_followed_and_digested() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("base.txt"), "pika\n").unwrap();
        std::fs::write(tmp.path().join("requirements.txt"), "-r base.txt\nyt-dlp\n").unwrap();

        let req = load(&tmp.path().join("requirements.txt")).unwrap();
        assert_eq!(req.includes.len(), 1);
        assert!(req.has_installables());
        let before = req.digest();

        std::fs::write(tmp.path().join("base.txt"), "pika==1.3.2\n").unwrap();
        let after = load(&tmp.path().join("requirements.txt")).unwrap().digest();
        assert_ne!(before, after);
    }

    #[test]
    fn test_missing_include_fails() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("requirements.txt"), "-r nope.txt\n").unwrap();
        let err = load(&tmp.path().join("requirements.txt")).unwrap_err();
        assert!(matches!(err, RequirementsError::Missing(p) if p.ends_with("nope.txt")));
    }

    #[test]
    fn test_self_include_hits_depth_limit() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("requirements.txt"), "-r requirements.txt\n").unwrap();
        let err = load(&tmp.path().join("requirements.txt")).unwrap_err();
        assert!(matches!(err, RequirementsError::IncludeDepth { .. }));
    }

    #[test]
    fn test_only_options_installs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("requirements.txt"), "# nothing\n--pre\n").unwrap();
        let req = load(&tmp.path().join("requirements.txt")).unwrap();
        assert!(!req.has_installables());
        assert_eq!(req.packages().count(), 0);
    }
}

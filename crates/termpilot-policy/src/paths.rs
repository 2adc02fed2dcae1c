use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Lexically normalize a path: resolve `.` and `..` without touching the
/// filesystem. Relative paths are joined onto `base` first.
pub fn normalize_path(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// True when `path` equals or descends from one of `roots`.
/// An empty root list places no restriction.
pub fn is_path_within(path: &Path, roots: &[PathBuf]) -> bool {
    if roots.is_empty() {
        return true;
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let target = normalize_path(path, &cwd);
    roots
        .iter()
        .map(|root| normalize_path(root, &cwd))
        .any(|root| target.starts_with(&root))
}

fn absolute_path_regex() -> &'static Regex {
    static ABSOLUTE: OnceLock<Regex> = OnceLock::new();
    ABSOLUTE.get_or_init(|| {
        Regex::new(r#"(?:^|[\s=:'"(<>|;&])(/[^\s'";|&<>()`$]*)"#)
            .expect("absolute path pattern must compile")
    })
}

fn cd_regex() -> &'static Regex {
    static CD: OnceLock<Regex> = OnceLock::new();
    CD.get_or_init(|| {
        Regex::new(r#"(?:^|[;&|(]\s*|\s)(?:cd|pushd)(?:\s+(?:"([^"]*)"|'([^']*)'|([^\s;&|)]+)))?\s*(?:$|[;&|)])"#)
            .expect("cd pattern must compile")
    })
}

fn expand_home(target: &str) -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
    if target == "~" {
        PathBuf::from(home)
    } else if let Some(rest) = target.strip_prefix("~/") {
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(target)
    }
}

/// Every filesystem location an input line refers to: absolute path
/// literals plus `cd`/`pushd` targets resolved against `cwd`.
/// A bare `cd` resolves to `$HOME`; `cd -` is ignored.
pub fn referenced_paths(input: &str, cwd: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for caps in absolute_path_regex().captures_iter(input) {
        if let Some(m) = caps.get(1) {
            // "//" comment markers and URL fragments are not paths
            if m.as_str().starts_with("//") {
                continue;
            }
            paths.push(normalize_path(Path::new(m.as_str()), cwd));
        }
    }

    for caps in cd_regex().captures_iter(input) {
        let target = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or("~");
        if target == "-" {
            continue;
        }
        let resolved = normalize_path(&expand_home(target), cwd);
        if !paths.contains(&resolved) {
            paths.push(resolved);
        }
    }

    paths
}

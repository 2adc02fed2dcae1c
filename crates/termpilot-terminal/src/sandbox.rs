//! Optional OS-level confinement for pipe-mode children.
//!
//! A [`SandboxAdapter`] rewrites a command line so it runs under a
//! confinement tool. [`initialize`] picks the best adapter the platform
//! offers and falls back to [`NoopSandbox`] on any problem, so enabling
//! the sandbox can never stop sessions from starting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Sandbox settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub enabled: bool,
    /// Extra writable paths besides the session's working directory
    #[serde(default)]
    pub allow_write: Vec<PathBuf>,
    #[serde(default)]
    pub allow_network: bool,
}

/// Rewrites a command line to run under confinement
pub trait SandboxAdapter: Send + Sync {
    /// Backend name for logs and status output
    fn name(&self) -> &str;

    /// Program and arguments that run `command args` inside the sandbox
    fn wrap(&self, command: &str, args: &[String], cwd: &Path) -> (String, Vec<String>);
}

/// Runs commands unchanged
#[derive(Debug, Default)]
pub struct NoopSandbox;

impl SandboxAdapter for NoopSandbox {
    fn name(&self) -> &str {
        "none"
    }

    fn wrap(&self, command: &str, args: &[String], _cwd: &Path) -> (String, Vec<String>) {
        (command.to_string(), args.to_vec())
    }
}

/// Linux confinement through bubblewrap: the host is mounted read-only,
/// the working directory and configured paths are writable, and the
/// network namespace is unshared unless network access is allowed.
#[derive(Debug)]
pub struct BubblewrapSandbox {
    program: PathBuf,
    allow_write: Vec<PathBuf>,
    allow_network: bool,
}

impl BubblewrapSandbox {
    pub fn new(program: PathBuf, config: &SandboxConfig) -> Self {
        Self {
            program,
            allow_write: config.allow_write.clone(),
            allow_network: config.allow_network,
        }
    }
}

impl SandboxAdapter for BubblewrapSandbox {
    fn name(&self) -> &str {
        "bubblewrap"
    }

    fn wrap(&self, command: &str, args: &[String], cwd: &Path) -> (String, Vec<String>) {
        let mut wrapped: Vec<String> = [
            "--ro-bind", "/", "/", "--dev", "/dev", "--proc", "/proc", "--tmpfs", "/tmp",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let cwd = cwd.display().to_string();
        for path in std::iter::once(cwd.clone())
            .chain(self.allow_write.iter().map(|p| p.display().to_string()))
        {
            wrapped.push("--bind".to_string());
            wrapped.push(path.clone());
            wrapped.push(path);
        }

        if !self.allow_network {
            wrapped.push("--unshare-net".to_string());
        }
        wrapped.push("--die-with-parent".to_string());
        wrapped.push("--chdir".to_string());
        wrapped.push(cwd);
        wrapped.push("--".to_string());
        wrapped.push(command.to_string());
        wrapped.extend(args.iter().cloned());

        (self.program.display().to_string(), wrapped)
    }
}

/// macOS confinement through `sandbox-exec` with a generated profile
#[derive(Debug)]
pub struct SeatbeltSandbox {
    program: PathBuf,
    allow_write: Vec<PathBuf>,
    allow_network: bool,
}

impl SeatbeltSandbox {
    pub fn new(program: PathBuf, config: &SandboxConfig) -> Self {
        Self {
            program,
            allow_write: config.allow_write.clone(),
            allow_network: config.allow_network,
        }
    }

    fn profile(&self, cwd: &Path) -> String {
        let mut profile = String::from("(version 1)\n(allow default)\n(deny file-write*)\n");
        let writable = std::iter::once(cwd)
            .chain(self.allow_write.iter().map(PathBuf::as_path))
            .chain([Path::new("/private/tmp"), Path::new("/private/var/folders"), Path::new("/dev")]);
        for path in writable {
            profile.push_str(&format!(
                "(allow file-write* (subpath \"{}\"))\n",
                escape_sbpl(&path.display().to_string())
            ));
        }
        if !self.allow_network {
            profile.push_str("(deny network*)\n");
        }
        profile
    }
}

impl SandboxAdapter for SeatbeltSandbox {
    fn name(&self) -> &str {
        "seatbelt"
    }

    fn wrap(&self, command: &str, args: &[String], cwd: &Path) -> (String, Vec<String>) {
        let mut wrapped = vec!["-p".to_string(), self.profile(cwd), command.to_string()];
        wrapped.extend(args.iter().cloned());
        (self.program.display().to_string(), wrapped)
    }
}

fn escape_sbpl(path: &str) -> String {
    path.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Locate an executable on `PATH`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Choose the sandbox for this platform.
///
/// Returns the no-op adapter when the sandbox is disabled, unsupported, or
/// its tool is missing.
pub fn initialize(config: &SandboxConfig) -> Arc<dyn SandboxAdapter> {
    if !config.enabled {
        return Arc::new(NoopSandbox);
    }

    let adapter: Option<Arc<dyn SandboxAdapter>> = if cfg!(target_os = "linux") {
        find_in_path("bwrap").map(|p| Arc::new(BubblewrapSandbox::new(p, config)) as Arc<dyn SandboxAdapter>)
    } else if cfg!(target_os = "macos") {
        find_in_path("sandbox-exec").map(|p| Arc::new(SeatbeltSandbox::new(p, config)) as Arc<dyn SandboxAdapter>)
    } else {
        None
    };

    match adapter {
        Some(adapter) => {
            log::info!("Sandbox enabled ({})", adapter.name());
            adapter
        }
        None => {
            log::warn!("Sandbox requested but no supported backend is available; running unconfined");
            Arc::new(NoopSandbox)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(allow_network: bool) -> SandboxConfig {
        SandboxConfig {
            enabled: true,
            allow_write: vec![PathBuf::from("/srv/cache")],
            allow_network,
        }
    }

    #[test]
    fn test_noop_passes_through() {
        let (program, args) = NoopSandbox.wrap("bash", &["-i".to_string()], Path::new("/tmp"));
        assert_eq!(program, "bash");
        assert_eq!(args, vec!["-i"]);
    }

    #[test]
    fn test_bubblewrap_command_line() {
        let sandbox = BubblewrapSandbox::new(PathBuf::from("/usr/bin/bwrap"), &config(false));
        let (program, args) = sandbox.wrap("bash", &["-i".to_string()], Path::new("/work"));
        assert_eq!(program, "/usr/bin/bwrap");

        let joined = args.join(" ");
        assert!(joined.starts_with("--ro-bind / / --dev /dev --proc /proc"));
        assert!(joined.contains("--bind /work /work"));
        assert!(joined.contains("--bind /srv/cache /srv/cache"));
        assert!(joined.contains("--unshare-net"));
        assert!(joined.ends_with("--chdir /work -- bash -i"));
    }

    #[test]
    fn test_bubblewrap_network_allowed() {
        let sandbox = BubblewrapSandbox::new(PathBuf::from("bwrap"), &config(true));
        let (_, args) = sandbox.wrap("sh", &[], Path::new("/work"));
        assert!(!args.iter().any(|a| a == "--unshare-net"));
    }

    #[test]
    fn test_seatbelt_profile() {
        let sandbox = SeatbeltSandbox::new(PathBuf::from("/usr/bin/sandbox-exec"), &config(false));
        let (_, args) = sandbox.wrap("zsh", &[], Path::new("/Users/me/project"));
        assert_eq!(args[0], "-p");
        assert!(args[1].contains("(subpath \"/Users/me/project\")"));
        assert!(args[1].contains("(deny network*)"));
        assert_eq!(args[2], "zsh");
    }

    #[test]
    fn test_disabled_is_noop() {
        let adapter = initialize(&SandboxConfig::default());
        assert_eq!(adapter.name(), "none");
    }

    #[test]
    fn test_escape_sbpl() {
        assert_eq!(escape_sbpl("a\"b\\c"), "a\\\"b\\\\c");
    }
}

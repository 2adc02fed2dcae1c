/// Signal names and delivery to single processes or whole process trees
use std::io;
use std::str::FromStr;
use termpilot_types::EngineError;

/// Signals a caller may deliver to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    Interrupt,
    #[default]
    Terminate,
    Kill,
    Hangup,
    Quit,
    Stop,
    Continue,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Kill => "SIGKILL",
            Signal::Hangup => "SIGHUP",
            Signal::Quit => "SIGQUIT",
            Signal::Stop => "SIGTSTP",
            Signal::Continue => "SIGCONT",
        }
    }

    #[cfg(unix)]
    fn as_raw(&self) -> libc::c_int {
        match self {
            Signal::Interrupt => libc::SIGINT,
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
            Signal::Hangup => libc::SIGHUP,
            Signal::Quit => libc::SIGQUIT,
            Signal::Stop => libc::SIGTSTP,
            Signal::Continue => libc::SIGCONT,
        }
    }
}

impl FromStr for Signal {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "INT" => Ok(Signal::Interrupt),
            "TERM" => Ok(Signal::Terminate),
            "KILL" => Ok(Signal::Kill),
            "HUP" => Ok(Signal::Hangup),
            "QUIT" => Ok(Signal::Quit),
            "TSTP" | "STOP" => Ok(Signal::Stop),
            "CONT" => Ok(Signal::Continue),
            _ => Err(EngineError::UnknownSignal(s.to_string())),
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Deliver a signal to one process
#[cfg(unix)]
pub fn signal_process(pid: u32, signal: Signal) -> io::Result<()> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn signal_process(_pid: u32, signal: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} delivery is not supported on this platform", signal),
    ))
}

/// Deliver a signal to the process group led by `pid` and to every
/// descendant found by walking the process table.
///
/// Best effort: processes that exit while the tree is being walked are
/// skipped. Fails only if nothing at all could be signalled.
#[cfg(unix)]
pub fn signal_process_tree(pid: u32, signal: Signal) -> io::Result<()> {
    let group_result = {
        let rc = unsafe { libc::killpg(pid as libc::pid_t, signal.as_raw()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    };

    let mut delivered = group_result.is_ok();
    for child in descendant_pids(pid) {
        if signal_process(child, signal).is_ok() {
            delivered = true;
        }
    }

    if delivered {
        Ok(())
    } else {
        signal_process(pid, signal).or(group_result)
    }
}

#[cfg(not(unix))]
pub fn signal_process_tree(pid: u32, signal: Signal) -> io::Result<()> {
    signal_process(pid, signal)
}

/// All transitive children of `pid`, parents before children
#[cfg(target_os = "linux")]
pub fn descendant_pids(pid: u32) -> Vec<u32> {
    let mut parents: Vec<(u32, u32)> = Vec::new();
    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    for entry in entries.flatten() {
        let Some(child) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if let Some(ppid) = parse_parent_pid(&stat) {
            parents.push((child, ppid));
        }
    }

    let mut result = Vec::new();
    let mut frontier = vec![pid];
    while let Some(parent) = frontier.pop() {
        for &(child, ppid) in &parents {
            if ppid == parent && child != pid && !result.contains(&child) {
                result.push(child);
                frontier.push(child);
            }
        }
    }
    result
}

#[cfg(not(target_os = "linux"))]
pub fn descendant_pids(_pid: u32) -> Vec<u32> {
    Vec::new()
}

/// Parent pid from a `/proc/<pid>/stat` line. The command name may
/// contain spaces and parentheses, so fields are read after the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_parent_pid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal_names() {
        assert_eq!("SIGINT".parse::<Signal>().unwrap(), Signal::Interrupt);
        assert_eq!("term".parse::<Signal>().unwrap(), Signal::Terminate);
        assert_eq!("SigKill".parse::<Signal>().unwrap(), Signal::Kill);
        assert_eq!("TSTP".parse::<Signal>().unwrap(), Signal::Stop);
        assert!(matches!(
            "SIGFOO".parse::<Signal>(),
            Err(EngineError::UnknownSignal(_))
        ));
        assert_eq!(Signal::default(), Signal::Terminate);
    }

    #[test]
    fn test_parse_parent_pid() {
        assert_eq!(parse_parent_pid("1234 (bash) S 1000 1234 1234 0"), Some(1000));
        assert_eq!(parse_parent_pid("77 (weird (name) x) R 12 77"), Some(12));
        assert_eq!(parse_parent_pid("garbage"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_descendants_of_spawned_shell() {
        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg("sleep 5 & wait")
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));

        let descendants = descendant_pids(child.id());
        assert!(!descendants.is_empty());

        signal_process_tree(child.id(), Signal::Kill).unwrap();
        let _ = child.kill();
        let _ = child.wait();
    }
}

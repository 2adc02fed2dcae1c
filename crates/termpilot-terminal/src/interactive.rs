/// Synthetic flags that make well-known interpreters interactive on pipes
use termpilot_policy::command_basename;

struct Family {
    /// Matches the executable basename
    matches: fn(&str) -> bool,
    /// Flags injected in front of the caller's arguments
    inject: &'static [&'static str],
    /// Any of these in the caller's arguments means a one-shot invocation
    non_interactive: &'static [&'static str],
    /// Flags that already request interactive mode
    already_interactive: &'static [&'static str],
}

fn is_shell(name: &str) -> bool {
    matches!(name, "bash" | "sh" | "zsh" | "dash" | "ksh" | "mksh" | "ash" | "fish")
}

fn is_python(name: &str) -> bool {
    let rest = name
        .strip_prefix("python")
        .or_else(|| name.strip_prefix("pypy"));
    match rest {
        Some(version) => version.chars().all(|c| c.is_ascii_digit() || c == '.'),
        None => false,
    }
}

fn is_node(name: &str) -> bool {
    matches!(name, "node" | "nodejs")
}

fn is_lua(name: &str) -> bool {
    name == "lua" || name.strip_prefix("lua").is_some_and(|v| v.chars().all(|c| c.is_ascii_digit() || c == '.'))
}

fn is_r(name: &str) -> bool {
    name == "R"
}

const FAMILIES: &[Family] = &[
    Family {
        matches: is_shell,
        inject: &["-i"],
        non_interactive: &["-c", "--command"],
        already_interactive: &["-i", "--interactive"],
    },
    Family {
        matches: is_python,
        inject: &["-i", "-u"],
        non_interactive: &["-c", "-m"],
        already_interactive: &["-i"],
    },
    Family {
        matches: is_node,
        inject: &["-i"],
        non_interactive: &["-e", "--eval", "-p", "--print"],
        already_interactive: &["-i", "--interactive"],
    },
    Family {
        matches: is_lua,
        inject: &["-i"],
        non_interactive: &["-e"],
        already_interactive: &["-i"],
    },
    Family {
        matches: is_r,
        inject: &["--interactive"],
        non_interactive: &["-e", "-f", "--file"],
        already_interactive: &["--interactive"],
    },
];

/// True if `arg` is `flag` itself or a combined short-option cluster
/// containing it (`-lc` contains `-c`).
fn has_flag(arg: &str, flag: &str) -> bool {
    if arg == flag || arg.starts_with(&format!("{}=", flag)) {
        return true;
    }
    match (flag.strip_prefix('-'), arg.strip_prefix('-')) {
        (Some(short), Some(cluster))
            if short.len() == 1 && !short.starts_with('-') && !cluster.starts_with('-') =>
        {
            cluster.chars().all(|c| c.is_ascii_alphabetic()) && cluster.contains(short)
        }
        _ => false,
    }
}

/// Arguments to use for `command` in pipe mode.
///
/// Known interpreter families get the minimal flags that keep them
/// interactive when stdin is not a terminal, unless the caller already
/// asked for a one-shot invocation or for interactive mode.
pub fn interactive_args(command: &str, args: &[String]) -> Vec<String> {
    let name = command_basename(command);
    let Some(family) = FAMILIES.iter().find(|f| (f.matches)(name)) else {
        return args.to_vec();
    };

    let mentions = |flags: &[&str]| {
        args.iter()
            .take_while(|a| a.as_str() != "--")
            .any(|a| flags.iter().any(|f| has_flag(a, f)))
    };

    if mentions(family.non_interactive) || mentions(family.already_interactive) {
        return args.to_vec();
    }

    family
        .inject
        .iter()
        .map(|s| s.to_string())
        .chain(args.iter().cloned())
        .collect()
}

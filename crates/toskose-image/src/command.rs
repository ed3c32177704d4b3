//! Launch-command discovery for containers toskosed without hosted components.

/// Shells a launch command may already start with.
pub const SUPPORTED_SHELLS: &[&str] = &[
    "/bin/bash",
    "/bin/sh",
    "/bin/zsh",
    "/bin/tcsh",
    "/bin/ksh",
    "/bin/fish",
];

const DEFAULT_SHELL: [&str; 2] = ["/bin/sh", "-c"];

fn bind_shell(command: &[String]) -> Vec<String> {
    match command.first() {
        Some(first) if SUPPORTED_SHELLS.contains(&first.as_str()) => command.to_vec(),
        _ => DEFAULT_SHELL
            .iter()
            .map(|s| (*s).to_string())
            .chain(command.iter().cloned())
            .collect(),
    }
}

/// Builds a supervised launch command from an image's `ENTRYPOINT` and `CMD`.
///
/// The command is bound to a shell (`/bin/sh -c` unless it already starts
/// with a supported one) and everything after the shell flag is quoted.
/// An image with neither sleeps forever.
#[must_use]
pub fn launch_command(entrypoint: &[String], cmd: &[String]) -> String {
    let parts = match (entrypoint.is_empty(), cmd.is_empty()) {
        (false, true) => bind_shell(entrypoint),
        (true, false) => bind_shell(cmd),
        (false, false) => {
            let mut parts = bind_shell(entrypoint);
            parts.extend(cmd.iter().cloned());
            parts
        }
        (true, true) => DEFAULT_SHELL
            .iter()
            .map(|s| (*s).to_string())
            .chain(["sleep".to_string(), "infinity".to_string()])
            .collect(),
    };
    match parts.as_slice() {
        [shell, flag, rest @ ..] if !rest.is_empty() => {
            format!("{shell} {flag} '{}'", rest.join(" "))
        }
        _ => parts.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn cmd_only_is_bound_to_the_default_shell() {
        assert_eq!(launch_command(&[], &v(&["mongod"])), "/bin/sh -c 'mongod'");
    }

    #[test]
    fn entrypoint_and_cmd_are_combined() {
        assert_eq!(
            launch_command(&v(&["docker-entrypoint.sh"]), &v(&["mongod", "--bind_ip_all"])),
            "/bin/sh -c 'docker-entrypoint.sh mongod --bind_ip_all'"
        );
    }

    #[test]
    fn supported_shell_is_kept() {
        assert_eq!(
            launch_command(&v(&["/bin/bash", "-c"]), &v(&["run.sh"])),
            "/bin/bash -c 'run.sh'"
        );
    }

    #[test]
    fn image_without_command_sleeps() {
        assert_eq!(launch_command(&[], &[]), "/bin/sh -c 'sleep infinity'");
    }
}

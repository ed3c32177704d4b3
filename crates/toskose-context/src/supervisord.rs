//! Supervisord configuration generation.
//!
//! A container hosting software components gets one program section per
//! `(component, operation)` pair. A container hosting nothing gets a single
//! `<container>-default` program wrapping its launch command. Every section
//! starts from the same baseline parameters.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use toskose_common::constants::{self, SUPERVISED_SHELL, SUPERVISORD_CONFIG_NAME};
use toskose_common::error::{Result, ToskoseError};
use toskose_tosca::model::SoftwareRef;

/// Global sections shared by every generated configuration.
const BASE_TEMPLATE: &str = include_str!("../templates/supervisord.base.conf");

/// Parameters every program section starts from.
pub const PROGRAM_BASELINE: &[(&str, &str)] = &[
    ("numprocs", "1"),
    ("umask", "022"),
    ("priority", "999"),
    ("autostart", "false"),
    ("startsecs", "0"),
    ("startretries", "3"),
    ("autorestart", "false"),
    ("exitcodes", "0"),
    ("stopsignal", "TERM"),
    ("stopwaitsecs", "10"),
    ("stopasgroup", "false"),
    ("killasgroup", "false"),
    ("user", "root"),
    ("redirect_stderr", "true"),
    ("stdout_logfile_maxbytes", "1MB"),
    ("stdout_logfile_backups", "10"),
    ("stdout_capture_maxbytes", "1MB"),
    ("stdout_events_enabled", "false"),
    ("serverurl", "AUTO"),
];

/// One `[program:<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSection {
    /// Program name, also used as `process_name`.
    pub name: String,
    /// Command run by supervisord.
    pub command: String,
    /// In-container log file of the program.
    pub stdout_logfile: String,
    /// Supervision parameters, in rendering order.
    pub parameters: Vec<(String, String)>,
}

impl ProgramSection {
    fn new(name: String, command: String, stdout_logfile: String) -> Self {
        Self {
            name,
            command,
            stdout_logfile,
            parameters: PROGRAM_BASELINE
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    /// Returns a supervision parameter by key.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The generated supervisord configuration of one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionConfig {
    programs: Vec<ProgramSection>,
}

impl SupervisionConfig {
    /// Builds the configuration of a container hosting software components.
    ///
    /// # Errors
    ///
    /// Returns a validation error if two operations map to the same program name.
    pub fn hosted(software: &[SoftwareRef<'_>]) -> Result<Self> {
        let mut programs: Vec<ProgramSection> = Vec::new();
        for sw in software {
            let name = &sw.node.name;
            for interface in &sw.software.interfaces {
                let program = format!("{name}-{}", interface.operation);
                if programs.iter().any(|p| p.name == program) {
                    return Err(ToskoseError::validation(format!(
                        "duplicate supervisord program {program}"
                    )));
                }
                let script = constants::script_path(name, &interface.command.basename());
                programs.push(ProgramSection::new(
                    program,
                    format!("{SUPERVISED_SHELL} '{script}'"),
                    constants::operation_log_path(name, &interface.operation),
                ));
            }
        }
        Ok(Self { programs })
    }

    /// Builds the configuration of a container hosting nothing.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the launch command is missing or empty.
    pub fn standalone(container: &str, launch_command: Option<&str>) -> Result<Self> {
        let Some(command) = launch_command.map(str::trim).filter(|c| !c.is_empty()) else {
            tracing::error!(container = %container, "no runnable launch command");
            return Err(ToskoseError::validation(format!(
                "container {container} must have a runnable command"
            )));
        };
        Ok(Self {
            programs: vec![ProgramSection::new(
                format!("{container}-default"),
                command.to_string(),
                format!("/toskose/{container}.log"),
            )],
        })
    }

    /// Returns the program sections, in rendering order.
    #[must_use]
    pub fn programs(&self) -> &[ProgramSection] {
        &self.programs
    }

    /// Returns a program section by name.
    #[must_use]
    pub fn program(&self, name: &str) -> Option<&ProgramSection> {
        self.programs.iter().find(|p| p.name == name)
    }

    /// Renders the configuration in supervisord's INI dialect.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from(BASE_TEMPLATE);
        for program in &self.programs {
            let _ = write!(
                out,
                "\n[program:{name}]\ncommand = {command}\nprocess_name = {name}\n",
                name = program.name,
                command = program.command,
            );
            for (key, value) in &program.parameters {
                let _ = writeln!(out, "{key} = {value}");
            }
            let _ = writeln!(out, "stdout_logfile = {}", program.stdout_logfile);
        }
        out
    }

    /// Writes `supervisord.conf` into `dir` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the file cannot be written.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(SUPERVISORD_CONFIG_NAME);
        std::fs::write(&path, self.render()).map_err(|e| ToskoseError::fatal_io(&path, &e))?;
        tracing::debug!(
            path = %path.display(),
            programs = self.programs.len(),
            "supervisord configuration written"
        );
        Ok(path)
    }
}

/// Returns the `[program:...]` section names of a rendered configuration.
#[must_use]
pub fn program_names(rendered: &str) -> Vec<String> {
    rendered
        .lines()
        .filter_map(|l| l.trim().strip_prefix("[program:")?.strip_suffix(']'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_wraps_the_launch_command() {
        let config =
            SupervisionConfig::standalone("db", Some("/bin/sh -c 'run.sh'")).expect("config");
        assert_eq!(program_names(&config.render()), vec!["db-default"]);
        let program = config.program("db-default").expect("program");
        assert_eq!(program.command, "/bin/sh -c 'run.sh'");
        assert_eq!(program.stdout_logfile, "/toskose/db.log");
    }

    #[test]
    fn standalone_without_command_is_a_validation_error() {
        for command in [None, Some(""), Some("   ")] {
            let err = SupervisionConfig::standalone("db", command).expect_err("must fail");
            assert!(matches!(err, ToskoseError::Validation { .. }));
        }
    }

    #[test]
    fn baseline_parameters_are_applied() {
        let config = SupervisionConfig::standalone("db", Some("mongod")).expect("config");
        let program = config.program("db-default").expect("program");
        assert_eq!(program.parameter("autostart"), Some("false"));
        assert_eq!(program.parameter("autorestart"), Some("false"));
        assert_eq!(program.parameter("stopsignal"), Some("TERM"));
        assert_eq!(program.parameter("user"), Some("root"));
    }

    #[test]
    fn rendering_keeps_the_global_sections() {
        let rendered = SupervisionConfig::standalone("db", Some("mongod"))
            .expect("config")
            .render();
        assert!(rendered.contains("[inet_http_server]"));
        assert!(rendered.contains("[supervisorctl]"));
        assert!(rendered.contains("stdout_logfile = /toskose/db.log"));
    }
}

//! Command lines for the DS9 FITS viewer.
//!
//! See <http://ds9.si.edu/doc/ref/command.html> for the option reference.

use std::{
    fmt,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Renderer finished but {} was not written", .0.display())]
    MissingOutput(PathBuf),
}

/// Ordered `-key value` options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ds9Options {
    options: Vec<(String, String)>,
}

impl Ds9Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, keeping the position of an existing key.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        match self.options.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.options.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Flag arguments: each key gains a leading `-` unless it has one, and
    /// each value is split on whitespace the way a shell would.
    pub fn args(&self) -> Vec<String> {
        self.options
            .iter()
            .flat_map(|(key, value)| {
                let flag = if key.starts_with('-') {
                    key.clone()
                } else {
                    format!("-{key}")
                };
                std::iter::once(flag).chain(value.split_whitespace().map(str::to_owned))
            })
            .collect()
    }
}

/// One viewer invocation that saves a JPEG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderCommand {
    pub program: String,
    pub args: Vec<String>,
    pub output: PathBuf,
}

impl RenderCommand {
    /// `<program> <fits> <options> -frame center -saveimage jpeg <output> <quality> -exit`
    pub fn save_jpeg(
        program: impl Into<String>,
        fits_path: &Path,
        options: &Ds9Options,
        output: &Path,
        quality: u8,
    ) -> Self {
        let mut args = vec![fits_path.display().to_string()];
        args.extend(options.args());
        args.extend(
            ["-frame", "center", "-saveimage", "jpeg"]
                .into_iter()
                .map(str::to_owned),
        );
        args.push(output.display().to_string());
        args.push(quality.to_string());
        args.push("-exit".to_owned());

        Self {
            program: program.into(),
            args,
            output: output.to_path_buf(),
        }
    }
}

impl fmt::Display for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs render commands to completion.
pub trait CommandRunner {
    fn run(&mut self, command: &RenderCommand) -> Result<(), CommandError>;
}

/// Runs commands as child processes, waiting for each and checking that it
/// succeeded and wrote its output.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&mut self, command: &RenderCommand) -> Result<(), CommandError> {
        log::debug!("{command}");
        let output = Command::new(&command.program)
            .args(&command.args)
            .output()
            .map_err(|source| CommandError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        if !command.output.is_file() {
            return Err(CommandError::MissingOutput(command.output.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_become_flags_in_order() {
        let options = Ds9Options::new()
            .set("cmap", "b")
            .set("scale", "mode 99.5")
            .set("-zoom", "to 3")
            .set("cmap", "invert yes");

        assert_eq!(options.get("cmap"), Some("invert yes"));
        assert_eq!(
            options.args(),
            ["-cmap", "invert", "yes", "-scale", "mode", "99.5", "-zoom", "to", "3"]
        );
    }

    #[test]
    fn save_command_line() {
        let options = Ds9Options::new().set("width", "128");
        let command = RenderCommand::save_jpeg(
            "ds9",
            Path::new("in/7/12.fits"),
            &options,
            Path::new("out/7_b.jpeg"),
            100,
        );

        assert_eq!(
            command.to_string(),
            "ds9 in/7/12.fits -width 128 -frame center -saveimage jpeg out/7_b.jpeg 100 -exit"
        );
        assert_eq!(command.output, Path::new("out/7_b.jpeg"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let command = RenderCommand {
            program: "definitely-not-an-installed-renderer".to_owned(),
            args: Vec::new(),
            output: PathBuf::from("never.jpeg"),
        };
        let err = ProcessRunner.run(&command).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_and_output_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.jpeg");
        let command = |program: &str| RenderCommand {
            program: program.to_owned(),
            args: Vec::new(),
            output: output.clone(),
        };

        let err = ProcessRunner.run(&command("false")).unwrap_err();
        assert!(matches!(err, CommandError::Failed { .. }));

        let err = ProcessRunner.run(&command("true")).unwrap_err();
        assert!(matches!(err, CommandError::MissingOutput(_)));

        std::fs::write(&output, b"jpeg").unwrap();
        ProcessRunner.run(&command("true")).unwrap();
    }
}

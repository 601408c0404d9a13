use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    io::Write,
    path::PathBuf,
    process::{Command as StdCommand, Output, Stdio},
    time::{Duration, Instant},
};

use log::trace;
use strum_macros::IntoStaticStr;

use pool_api::error::{PoolError, PoolResultExt, ReportError, SubsystemError};

/// Every external binary this crate shells out to. Centralizing the list
/// here means a missing dependency is reported once, by name, instead of as
/// a bare "No such file or directory" from wherever happened to invoke it.
#[derive(Debug, Clone, Copy, IntoStaticStr, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Dependency {
    Parted,
    Partprobe,
    Blkid,
    Lsblk,
    Blockdev,
    Udevadm,
    #[strum(serialize = "mkfs.ext4")]
    MkfsExt4,
    #[strum(serialize = "mkfs.xfs")]
    MkfsXfs,
    #[strum(serialize = "mkfs.btrfs")]
    MkfsBtrfs,
    Mount,
    Umount,
    Fuser,
    Chown,
    Df,
    Btrfs,
    Mergerfs,
    Cryptsetup,
    Dmsetup,
    Modprobe,
    Lsmod,
    Findmnt,
    Hdparm,
    Smartctl,
    Dd,
    #[strum(serialize = "mos-snapraid")]
    MosSnapraid,
    // test-only
    #[cfg(test)]
    DoesNotExist,
    #[cfg(test)]
    Echo,
    #[cfg(test)]
    Cat,
    #[cfg(test)]
    False,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into())
    }
}

impl Dependency {
    /// Dependencies not reliably on `$PATH` for a stripped-down host.
    fn path_override(&self) -> Option<PathBuf> {
        Some(PathBuf::from(match self {
            Self::MosSnapraid => "/usr/local/bin/mos-snapraid",
            _ => return None,
        }))
    }

    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn exists(&self) -> bool {
        self.path().is_ok()
    }

    pub fn path(&self) -> Result<PathBuf, PoolError> {
        which::which(match self.path_override() {
            Some(path) => path,
            None => self.name().into(),
        })
        .structured(SubsystemError {
            command: self.name().into(),
            detail: "dependency not found on this host".into(),
        })
    }

    pub fn cmd(&self) -> Command {
        Command {
            dependency: *self,
            args: vec![],
            stdin: None,
            timeout: None,
        }
    }
}

/// A single invocation of a [`Dependency`], built up with argv, an optional
/// stdin payload (used for passphrases, never passed via argv), and an
/// optional wall-clock timeout.
pub struct Command {
    dependency: Dependency,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl Command {
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg.as_ref());
        }
        self
    }

    /// Data to write to the child's stdin once it's spawned, then close.
    /// Used so secrets (LUKS passphrases) never show up in `ps` output.
    pub fn stdin(&mut self, payload: impl Into<Vec<u8>>) -> &mut Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn run_and_check(&self) -> Result<(), PoolError> {
        self.output()?.check()
    }

    pub fn output_and_check(&self) -> Result<String, PoolError> {
        self.output()?.check_output()
    }

    pub fn raw_output_and_check(&self) -> Result<Output, PoolError> {
        self.output()?.check_raw_output()
    }

    /// Renders argv as a shell-like string without running anything; used by
    /// the CLI's `--dry-run` surface to show a command plan.
    pub fn render_command(&self) -> String {
        if self.args.is_empty() {
            self.dependency.to_string()
        } else {
            format!(
                "{} {}",
                self.dependency,
                self.args
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .map(|arg| if arg.contains(' ') {
                        format!("'{arg}'")
                    } else {
                        arg.into()
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        }
    }

    pub fn output(&self) -> Result<CommandOutput, PoolError> {
        let rendered_command = self.render_command();
        let subsystem_err = || SubsystemError {
            command: self.dependency.name().into(),
            detail: format!("failed to spawn '{rendered_command}'"),
        };

        let mut cmd = StdCommand::new(self.dependency.path()?);
        cmd.args(&self.args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        if self.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        trace!("Executing '{rendered_command}'");
        let mut child = cmd.spawn().structured(subsystem_err())?;

        if let Some(payload) = &self.stdin {
            child
                .stdin
                .take()
                .expect("stdin was requested as piped")
                .write_all(payload)
                .structured(subsystem_err())?;
        }

        let inner = match self.timeout {
            Some(timeout) => wait_with_timeout(child, timeout, &rendered_command)?,
            None => child.wait_with_output().structured(subsystem_err())?,
        };

        let output = CommandOutput {
            rendered_command: rendered_command.clone(),
            dependency: self.dependency,
            inner,
        };
        trace!(
            "Executed '{rendered_command}': {}. Report:\n{}",
            output.explain_exit(),
            output.output_report(),
        );
        Ok(output)
    }
}

fn wait_with_timeout(
    mut child: std::process::Child,
    timeout: Duration,
    rendered_command: &str,
) -> Result<Output, PoolError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().structured(SubsystemError {
            command: rendered_command.into(),
            detail: "failed to poll child process".into(),
        })? {
            let mut out = Output {
                status,
                stdout: Vec::new(),
                stderr: Vec::new(),
            };
            if let Some(mut stdout) = child.stdout.take() {
                use std::io::Read;
                let _ = stdout.read_to_end(&mut out.stdout);
            }
            if let Some(mut stderr) = child.stderr.take() {
                use std::io::Read;
                let _ = stderr.read_to_end(&mut out.stderr);
            }
            return Ok(out);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PoolError::new(SubsystemError {
                command: rendered_command.into(),
                detail: format!("timed out after {timeout:?}"),
            }));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    rendered_command: String,
    dependency: Dependency,
    inner: Output,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.inner.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.inner.status.code()
    }

    pub fn error_output(&self) -> String {
        String::from_utf8_lossy(&self.inner.stderr).into()
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.inner.stdout).into()
    }

    pub fn output_report(&self) -> String {
        let stdout = self.output();
        let stderr = self.error_output();
        let mut res = String::with_capacity(stdout.len() + stderr.len() + 20);
        if !stdout.is_empty() {
            res += &format!("stdout:\n{stdout}\n");
        }
        if !stderr.is_empty() {
            if !res.is_empty() {
                res += "\n";
            }
            res += &format!("stderr:\n{stderr}\n");
        }
        res
    }

    pub fn check(&self) -> Result<(), PoolError> {
        if self.success() {
            return Ok(());
        }
        Err(PoolError::new(SubsystemError {
            command: self.dependency.name().into(),
            detail: format!(
                "'{}' {}: {}",
                self.rendered_command,
                self.explain_exit(),
                match self.output_report() {
                    s if !s.is_empty() => s,
                    _ => "(no output collected)".into(),
                }
            ),
        }))
    }

    pub fn check_output(&self) -> Result<String, PoolError> {
        self.check()?;
        Ok(self.output())
    }

    pub fn check_raw_output(self) -> Result<Output, PoolError> {
        self.check()?;
        Ok(self.inner)
    }

    fn explain_exit(&self) -> String {
        match self.code() {
            Some(code) => format!("exited with status: {code}"),
            None => "exited with unknown status".into(),
        }
    }
}

/// Attaches an additional context message while keeping the underlying
/// [`ErrorKind`](pool_api::error::ErrorKind).
pub trait DependencyResultExt<T> {
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, PoolError>;
}

impl<T> DependencyResultExt<T> for Result<T, PoolError> {
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, PoolError> {
        PoolResultExt::message(self, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command() {
        assert_eq!(
            Dependency::Echo
                .cmd()
                .arg("Hello, world")
                .output_and_check()
                .unwrap(),
            "Hello, world\n"
        );
    }

    #[test]
    fn test_stdin_is_piped_to_child() {
        let output = Dependency::Cat.cmd().stdin(b"secret\n".to_vec()).output_and_check();
        assert_eq!(output.unwrap(), "secret\n");
    }

    #[test]
    fn test_nonexistent_dep() {
        let err = Dependency::DoesNotExist.cmd().output().unwrap_err();
        assert!(matches!(
            err.kind(),
            pool_api::error::ErrorKind::Subsystem(_)
        ));
    }

    #[test]
    fn test_command_failure() {
        let err = Dependency::False.cmd().run_and_check().unwrap_err();
        assert!(err.to_string().contains("false"));
    }

    #[test]
    fn test_timeout_allows_fast_command_to_finish() {
        use std::time::Duration;
        let output = Dependency::Echo
            .cmd()
            .arg("fast")
            .timeout(Duration::from_secs(5))
            .output_and_check();
        assert_eq!(output.unwrap(), "fast\n");
    }
}

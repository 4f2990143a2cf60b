//! Production process runner.
//!
//! `SystemRunner` spawns real processes and bounds every invocation with a
//! timeout. A hung external client would otherwise block the whole controller,
//! since all operations are synchronous.

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{RcmError, Result};

use super::{CommandLine, ProcessRunner};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Runner that executes commands against the real system.
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        SystemRunner { timeout }
    }

    fn spawn(&self, cmd: &CommandLine) -> Result<Child> {
        Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RcmError::ProcessLaunch {
                program: cmd.program_name(),
                source,
            })
    }

    /// Wait for the child within the configured timeout. On expiry the child
    /// is killed and `ExternalCommandTimeout` is returned.
    fn wait(&self, cmd: &CommandLine, child: &mut Child) -> Result<i32> {
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status.code().unwrap_or(-1));
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RcmError::ExternalCommandTimeout {
                    program: cmd.program_name(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn run_and_collect(&self, cmd: &CommandLine) -> Result<String> {
        log::debug!("exec: {}", cmd);

        let mut child = self.spawn(cmd)?;
        let status = self.wait(cmd, &mut child)?;

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout)?;
        }

        if status != 0 {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(RcmError::ExternalCommandFailed {
                program: cmd.program_name(),
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        SystemRunner::new(DEFAULT_TIMEOUT)
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, cmd: &CommandLine) -> Result<()> {
        self.run_and_collect(cmd).map(|_| ())
    }

    fn capture(&self, cmd: &CommandLine) -> Result<String> {
        self.run_and_collect(cmd)
    }

    fn exec(&self, cmd: &CommandLine) -> Result<()> {
        // exec replaces the process image; reaching the line below means the
        // syscall itself failed.
        let source = Command::new(&cmd.program).args(&cmd.args).exec();
        Err(RcmError::ProcessLaunch {
            program: cmd.program_name(),
            source,
        })
    }
}

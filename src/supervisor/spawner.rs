//! How worker processes are started.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use tokio::process::{Child, Command};

/// Starts the process for a pool slot.
pub trait WorkerSpawner: Send + Sync + 'static {
    fn spawn(&self, slot: usize) -> io::Result<Child>;
}

impl<F> WorkerSpawner for F
where
    F: Fn(usize) -> io::Result<Child> + Send + Sync + 'static,
{
    fn spawn(&self, slot: usize) -> io::Result<Child> {
        self(slot)
    }
}

/// Re-executes a gateway binary in worker mode:
/// `<program> [global args] worker --id <slot>`.
#[derive(Debug, Clone)]
pub struct ExecSpawner {
    program: PathBuf,
    global_args: Vec<OsString>,
}

impl ExecSpawner {
    pub fn new(program: PathBuf, global_args: Vec<OsString>) -> Self {
        Self {
            program,
            global_args,
        }
    }

    /// Spawner for the running executable.
    pub fn current_exe(global_args: Vec<OsString>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, global_args))
    }

    fn command(&self, slot: usize) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.global_args)
            .arg("worker")
            .arg("--id")
            .arg(slot.to_string())
            .kill_on_drop(true);
        command
    }
}

impl WorkerSpawner for ExecSpawner {
    fn spawn(&self, slot: usize) -> io::Result<Child> {
        self.command(slot).spawn()
    }
}

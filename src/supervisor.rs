use std::future::Future;
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::ProcessError;

const REQUEST_BUFFER: usize = 8;

/// Lifecycle of one managed process instance. Instances are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Terminating,
    Exited,
}

/// The user's command, running as the leader of its own process group.
pub struct ManagedProcess {
    pid: u32,
    child: Child,
    state: ProcessState,
}

impl ManagedProcess {
    /// Launch `command` as a new process group leader.
    ///
    /// Stdout and stderr are inherited, stdin is not wired. Returns once the OS
    /// has handed back a pid, not once the command produced any output.
    pub fn start(command: &str, args: &[String]) -> Result<Self, ProcessError> {
        let child = Command::new(command)
            .args(args)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ProcessError::Launch {
                command: command.to_string(),
                source,
            })?;

        let pid = child.id().ok_or_else(|| ProcessError::Launch {
            command: command.to_string(),
            source: std::io::Error::other("process exited before its pid was observed"),
        })?;

        let mut process = Self {
            pid,
            child,
            state: ProcessState::Starting,
        };
        process.transition(ProcessState::Running);
        Ok(process)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Process group id. Equal to the pid: the child leads its own group.
    pub fn pgid(&self) -> i32 {
        self.pid as i32
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// SIGKILL the whole group, then reap the leader.
    ///
    /// A group that no longer exists counts as killed. On any other kill
    /// failure the process keeps its previous state and nothing is reaped.
    /// A process that already exited is left alone: once the leader is reaped
    /// its pid may be reused, and so may the group id.
    pub async fn terminate(&mut self) -> Result<(), ProcessError> {
        if self.state == ProcessState::Exited {
            return Ok(());
        }
        let previous = self.state;
        self.transition(ProcessState::Terminating);

        match killpg(Pid::from_raw(self.pgid()), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(source) => {
                self.transition(previous);
                return Err(ProcessError::Kill {
                    pgid: self.pgid(),
                    source,
                });
            }
        }

        self.child
            .wait()
            .await
            .map_err(|source| ProcessError::Wait {
                pid: self.pid,
                source,
            })?;
        self.transition(ProcessState::Exited);
        Ok(())
    }

    /// Record that the leader exited on its own and kill what it left behind
    /// in its group. Runs right after the leader is reaped, before its pid can
    /// be handed to anyone else in practice.
    fn exited(&mut self) {
        self.transition(ProcessState::Exited);
        match killpg(Pid::from_raw(self.pgid()), Signal::SIGKILL) {
            Ok(()) => tracing::debug!("[supervisor] killed leftovers of group {}", self.pgid()),
            Err(Errno::ESRCH) => {}
            Err(err) => {
                tracing::warn!("failed to kill leftovers of group {}: {err}", self.pgid());
            }
        }
    }

    fn transition(&mut self, to: ProcessState) {
        tracing::debug!("[supervisor] process {}: {:?} -> {:?}", self.pid, self.state, to);
        self.state = to;
    }
}

/// Actions other tasks may request on the managed process.
///
/// `restart` and `terminate` resolve to the pid of the process that is current
/// once the action completes.
pub trait ProcessControl {
    /// Pid of the process that is current right now.
    fn current_pid(&self) -> u32;

    /// Kill the current process group, reap it, and start a fresh instance.
    fn restart(&self) -> impl Future<Output = Result<u32, ProcessError>> + Send;

    /// Kill the current process group and reap it. No restart follows.
    fn terminate(&self) -> impl Future<Output = Result<u32, ProcessError>> + Send;
}

enum Request {
    Restart(oneshot::Sender<Result<u32, ProcessError>>),
    Terminate(oneshot::Sender<Result<u32, ProcessError>>),
}

enum Next {
    Request(Option<Request>),
    Exited(std::io::Result<std::process::ExitStatus>),
}

/// Sole owner of the current [`ManagedProcess`].
///
/// Runs as one task and serves requests strictly one at a time, so a restart
/// in progress always finishes before a terminate is looked at, and a
/// terminate always hits the newest process.
pub struct Supervisor {
    command: String,
    args: Vec<String>,
    current: ManagedProcess,
    requests: mpsc::Receiver<Request>,
    pid: watch::Sender<u32>,
    stopped: bool,
}

impl Supervisor {
    /// Launch the first process and spawn the owner task.
    pub fn spawn(
        command: String,
        args: Vec<String>,
    ) -> Result<(SupervisorHandle, JoinHandle<()>), ProcessError> {
        let current = ManagedProcess::start(&command, &args)?;
        tracing::debug!("[supervisor] started {} (pid {})", command, current.pid());

        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let (pid_tx, pid_rx) = watch::channel(current.pid());
        let supervisor = Self {
            command,
            args,
            current,
            requests: rx,
            pid: pid_tx,
            stopped: false,
        };
        let task = tokio::spawn(supervisor.run());
        let handle = SupervisorHandle {
            requests: tx,
            pid: pid_rx,
        };
        Ok((handle, task))
    }

    async fn run(mut self) {
        loop {
            let running = self.current.state() == ProcessState::Running;
            let next = tokio::select! {
                request = self.requests.recv() => Next::Request(request),
                status = self.current.child.wait(), if running => Next::Exited(status),
            };

            match next {
                Next::Request(None) => break,
                Next::Request(Some(Request::Restart(reply))) => {
                    let _ = reply.send(self.restart().await);
                }
                Next::Request(Some(Request::Terminate(reply))) => {
                    let _ = reply.send(self.terminate().await);
                }
                Next::Exited(Ok(status)) => {
                    tracing::info!("process {} exited: {status}", self.current.pid());
                    self.current.exited();
                }
                Next::Exited(Err(err)) => {
                    tracing::error!("failed to wait for process {}: {err}", self.current.pid());
                    self.current.exited();
                }
            }
        }
    }

    async fn restart(&mut self) -> Result<u32, ProcessError> {
        if self.stopped {
            return Err(ProcessError::Stopped);
        }
        self.current.terminate().await?;
        self.current = ManagedProcess::start(&self.command, &self.args)?;
        self.pid.send_replace(self.current.pid());
        tracing::debug!("[supervisor] restarted {} (pid {})", self.command, self.current.pid());
        Ok(self.current.pid())
    }

    async fn terminate(&mut self) -> Result<u32, ProcessError> {
        if !self.stopped {
            self.current.terminate().await?;
            self.stopped = true;
        }
        Ok(self.current.pid())
    }
}

/// Cloneable front door to the [`Supervisor`] task.
#[derive(Clone)]
pub struct SupervisorHandle {
    requests: mpsc::Sender<Request>,
    pid: watch::Receiver<u32>,
}

impl SupervisorHandle {
    async fn request(
        &self,
        make: fn(oneshot::Sender<Result<u32, ProcessError>>) -> Request,
    ) -> Result<u32, ProcessError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| ProcessError::Stopped)?;
        rx.await.map_err(|_| ProcessError::Stopped)?
    }
}

impl ProcessControl for SupervisorHandle {
    fn current_pid(&self) -> u32 {
        *self.pid.borrow()
    }

    fn restart(&self) -> impl Future<Output = Result<u32, ProcessError>> + Send {
        self.request(Request::Restart)
    }

    fn terminate(&self) -> impl Future<Output = Result<u32, ProcessError>> + Send {
        self.request(Request::Terminate)
    }
}

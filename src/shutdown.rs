use std::fmt;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ShutdownError;
use crate::supervisor::ProcessControl;

/// How many signals we act on before giving up on a process group that will
/// not die.
pub const MAX_KILL_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Install SIGINT and SIGTERM handlers and forward every delivery into a channel.
///
/// Call this before the managed process is launched so an early Ctrl-C cannot
/// take the supervisor down with its child still running.
pub fn listen() -> std::io::Result<mpsc::Receiver<ShutdownSignal>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = interrupt.recv() => ShutdownSignal::Interrupt,
                Some(()) = terminate.recv() => ShutdownSignal::Terminate,
                else => break,
            };
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Wait for a termination signal, stop the dispatcher and kill the managed
/// process group.
///
/// If the kill fails the handler re-arms and waits for the next signal, up to
/// `max_attempts` signals in total. Returns the pid of the killed process.
pub async fn handle<P: ProcessControl>(
    mut signals: mpsc::Receiver<ShutdownSignal>,
    process: P,
    run_flag: CancellationToken,
    max_attempts: usize,
) -> Result<u32, ShutdownError> {
    let mut attempts = 0;
    loop {
        let Some(received) = signals.recv().await else {
            return Err(ShutdownError::SignalsClosed);
        };
        attempts += 1;
        run_flag.cancel();
        tracing::info!(
            "signal caught ({received}), killing process {}",
            process.current_pid()
        );

        match process.terminate().await {
            Ok(pid) => {
                tracing::info!("killed process {pid}");
                return Ok(pid);
            }
            Err(last) if attempts >= max_attempts => {
                return Err(ShutdownError::KillFailed { attempts, last });
            }
            Err(err) => {
                tracing::error!(
                    "failed to kill process ({attempts}/{max_attempts}): {err}; send another signal to retry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use std::future::Future;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` terminate calls, then succeeds.
    #[derive(Clone, Default)]
    struct FlakyKill {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    impl ProcessControl for FlakyKill {
        fn current_pid(&self) -> u32 {
            100
        }

        fn restart(&self) -> impl Future<Output = Result<u32, ProcessError>> + Send {
            async { Err(ProcessError::Stopped) }
        }

        fn terminate(&self) -> impl Future<Output = Result<u32, ProcessError>> + Send {
            async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if call < self.failures {
                    Err(ProcessError::Kill {
                        pgid: 100,
                        source: nix::errno::Errno::EPERM,
                    })
                } else {
                    Ok(100)
                }
            }
        }
    }

    /// Log sink for asserting on formatted lines.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_signal_log_names_the_process() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (tx, rx) = mpsc::channel(4);
        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        handle(rx, FlakyKill::default(), CancellationToken::new(), MAX_KILL_ATTEMPTS)
            .await
            .unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(
            output.contains("signal caught (SIGINT), killing process 100"),
            "log: {output}"
        );
    }

    #[tokio::test]
    async fn test_first_signal_kills_and_clears_run_flag() {
        let (tx, rx) = mpsc::channel(4);
        let process = FlakyKill::default();
        let run_flag = CancellationToken::new();

        tx.send(ShutdownSignal::Terminate).await.unwrap();
        let pid = handle(rx, process.clone(), run_flag.clone(), MAX_KILL_ATTEMPTS)
            .await
            .unwrap();

        assert_eq!(pid, 100);
        assert!(run_flag.is_cancelled());
        assert_eq!(process.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_kill_waits_for_second_signal() {
        let (tx, rx) = mpsc::channel(4);
        let process = FlakyKill {
            failures: 1,
            ..FlakyKill::default()
        };
        let run_flag = CancellationToken::new();
        let mut task = tokio::spawn(handle(
            rx,
            process.clone(),
            run_flag.clone(),
            MAX_KILL_ATTEMPTS,
        ));

        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(200), &mut task).await;
        assert!(pending.is_err(), "handler must not exit after a failed kill");
        assert_eq!(process.calls.load(Ordering::SeqCst), 1);
        assert!(run_flag.is_cancelled());

        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        let pid = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("handler finishes after second signal")
            .unwrap()
            .unwrap();
        assert_eq!(pid, 100);
        assert_eq!(process.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_kill_failure_is_capped() {
        let (tx, rx) = mpsc::channel(4);
        let process = FlakyKill {
            failures: usize::MAX,
            ..FlakyKill::default()
        };
        for _ in 0..3 {
            tx.send(ShutdownSignal::Terminate).await.unwrap();
        }

        let err = handle(rx, process.clone(), CancellationToken::new(), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, ShutdownError::KillFailed { attempts: 3, .. }));
        assert_eq!(process.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_closed_signal_source_is_an_error() {
        let (tx, rx) = mpsc::channel::<ShutdownSignal>(4);
        drop(tx);

        let err = handle(rx, FlakyKill::default(), CancellationToken::new(), MAX_KILL_ATTEMPTS)
            .await
            .unwrap_err();

        assert!(matches!(err, ShutdownError::SignalsClosed));
    }

    #[tokio::test]
    async fn test_listen_forwards_sigterm() {
        let mut rx = listen().unwrap();

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("signal forwarded")
            .expect("channel open");
        assert_eq!(received, ShutdownSignal::Terminate);
    }
}

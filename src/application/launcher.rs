//! Spawning yt-dlp and stopping it again, including any helper processes
//! it started (ffmpeg during merges).

use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::events::{ProcessOutput, RunId, SessionInput, WeakSessionHandle};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

const READ_CHUNK: usize = 8 * 1024;

/// Where a launched process reports its output and exit.
#[derive(Debug, Clone)]
pub struct ProcessSink {
    run: RunId,
    inbox: WeakSessionHandle,
}

impl ProcessSink {
    pub fn new(run: RunId, inbox: WeakSessionHandle) -> Self {
        Self { run, inbox }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn stdout(&self, chunk: Vec<u8>) {
        self.forward(ProcessOutput::Stdout(chunk));
    }

    pub fn stderr(&self, chunk: Vec<u8>) {
        self.forward(ProcessOutput::Stderr(chunk));
    }

    pub fn exited(&self, code: Option<i32>) {
        self.forward(ProcessOutput::Exited(code));
    }

    fn forward(&self, output: ProcessOutput) {
        let delivered = self.inbox.send(SessionInput::Process {
            run: self.run,
            output,
        });
        if !delivered {
            debug!(run = self.run, "session loop gone, dropping process output");
        }
    }
}

pub trait RunningProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Kills the process and everything it spawned. Calling it again is a
    /// no-op. The exit still arrives through the sink.
    fn terminate_tree(&mut self);
}

pub trait ProcessLauncher: Send {
    fn launch(
        &mut self,
        program: &Path,
        args: &[String],
        sink: ProcessSink,
    ) -> io::Result<Box<dyn RunningProcess>>;
}

/// Launches real processes on the tokio runtime.
#[derive(Debug, Default)]
pub struct TokioLauncher;

impl ProcessLauncher for TokioLauncher {
    fn launch(
        &mut self,
        program: &Path,
        args: &[String],
        sink: ProcessSink,
    ) -> io::Result<Box<dyn RunningProcess>> {
        let mut command = Command::new(program);
        command
            .args(args)
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so the whole tree can be signalled at once
        #[cfg(unix)]
        command.process_group(0);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let child = command.spawn()?;
        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(child, kill_rx, sink));

        Ok(Box::new(TokioProcess {
            pid,
            kill: Some(kill_tx),
        }))
    }
}

struct TokioProcess {
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
}

impl RunningProcess for TokioProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn terminate_tree(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

/// Pumps both pipes, waits for the exit, then reports it. The exit is only
/// sent after every byte of output has been forwarded.
async fn supervise(mut child: Child, kill_rx: oneshot::Receiver<()>, sink: ProcessSink) {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let run = sink.run();
    let out_sink = sink.clone();
    let err_sink = sink.clone();
    let pump_stdout = async move {
        if let Some(stdout) = stdout {
            pump(stdout, |chunk| out_sink.stdout(chunk)).await;
        }
    };
    let pump_stderr = async move {
        if let Some(stderr) = stderr {
            pump(stderr, |chunk| err_sink.stderr(chunk)).await;
        }
    };
    let wait = async move {
        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = kill_rx => {
                // The tree kill has to see the parent alive to find its
                // descendants, so the direct kill only follows a failed one
                let killed = match child.id() {
                    Some(pid) => terminate_tree(pid).await,
                    None => false,
                };
                if !killed {
                    let _ = child.start_kill();
                }
                child.wait().await
            }
        };
        match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(run, "waiting for yt-dlp failed: {}", e);
                None
            }
        }
    };

    let ((), (), code) = tokio::join!(pump_stdout, pump_stderr, wait);
    debug!(run, ?code, "process exited");
    sink.exited(code);
}

async fn pump<R>(mut reader: R, forward: impl Fn(Vec<u8>))
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => forward(buf[..n].to_vec()),
            Err(e) => {
                debug!("pipe read failed: {}", e);
                break;
            }
        }
    }
}

/// Kills `pid` and its descendants. Returns false when the kill could not
/// be confirmed.
#[cfg(windows)]
pub async fn terminate_tree(pid: u32) -> bool {
    let status = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .creation_flags(CREATE_NO_WINDOW)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    report_tree_kill(pid, status)
}

/// Kills `pid` and its descendants. Returns false when the kill could not
/// be confirmed.
#[cfg(unix)]
pub async fn terminate_tree(pid: u32) -> bool {
    // Negative pid addresses the process group created at spawn
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    report_tree_kill(pid, status)
}

fn report_tree_kill(pid: u32, status: io::Result<std::process::ExitStatus>) -> bool {
    match status {
        Ok(status) if status.success() => {
            debug!(pid, "process tree terminated");
            true
        }
        Ok(status) => {
            debug!(pid, ?status, "tree kill reported failure, falling back to direct kill");
            false
        }
        Err(e) => {
            warn!(pid, "could not run tree kill: {}", e);
            false
        }
    }
}

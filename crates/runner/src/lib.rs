//! Process supervisor for the translation worker.
//!
//! Runs named long-lived processes (batch consumers, pollers) side by side,
//! cancels all of them when one fails or the host asks us to stop, and then
//! gives the registered closers a bounded window to release resources.
//!
//! # Example
//!
//! ```no_run
//! use translate_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("document_consumer", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxedResult = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-lived process. Receives the shared cancellation token.
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedResult + Send>;

/// A cleanup step run once all processes have stopped.
pub type Closer = Box<dyn FnOnce() -> BoxedResult + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

/// Supervises app processes and closers.
///
/// Processes run concurrently until one fails, one panics, or a shutdown
/// signal arrives. Closers always run afterwards.
pub struct Runner {
    processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// New runner with a 10 second closer timeout
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an app process whose name shows up in lifecycle logs
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Adds a closer. Every closer runs even if an earlier one fails.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token so callers can stop the runner
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run to completion and exit the process: 1 if any process failed,
    /// 0 otherwise.
    pub async fn run(self) {
        let token = self.cancellation_token.clone();
        spawn_signal_handlers(token);

        match self.run_until_stopped().await {
            Ok(()) => {
                info!("application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                error!(error = format!("{:#}", err), "application exiting with error");
                std::process::exit(1);
            }
        }
    }

    /// Run processes until they all finish or the token is cancelled, then
    /// run closers. Returns the first process error, if any.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.processes {
            let process_token = token.clone();
            info!(process = %name, "starting app process");
            join_set.spawn(async move { (name, process(process_token).await) });
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "app process completed");
                }
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, error = format!("{:#}", err), "app process failed");
                        first_error = Some(err.context(format!("process {name} failed")));
                        token.cancel();
                    }
                }
                Err(err) => {
                    error!(error = %err, "app process panicked");
                    if first_error.is_none() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {err}"));
                    }
                    token.cancel();
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        join_set.shutdown().await;

        if !self.closers.is_empty() {
            info!(timeout = ?self.closer_timeout, "running closers");
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("all closers completed"),
                Err(_) => error!(timeout = ?self.closer_timeout, "closers timed out"),
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received interrupt signal");
                ctrl_c_token.cancel();
            }
            Err(err) => error!(error = %err, "failed to listen for interrupt signal"),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM");
                token.cancel();
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    });
}

/// Runs all closers concurrently, logging each failure
async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(err)) => error!(error = format!("{:#}", err), "closer failed"),
            Err(err) => error!(error = %err, "closer panicked"),
        }
    }
}

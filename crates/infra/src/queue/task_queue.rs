//! Task queue gated on application configuration.
//!
//! Jobs submitted before an application id is set are held in a FIFO backlog
//! and released, in submission order, the moment
//! [`TaskQueue::set_application_id`] succeeds, or at the next submission if
//! the id was stored on the shared [`AppConfig`] directly. Submitting with `force` skips
//! the gate. Released jobs go to a fixed pool of Tokio workers; with one
//! worker (the default) all traffic, backoff sleeps included, is serialized.
//!
//! Every task submitted with a listener reaches that listener exactly once.
//! If the job is discarded (shutdown, panic inside the task) the listener
//! receives an error instead of silence.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use pinpost_core::{AppConfig, Listener, Task};
use pinpost_domain::{ApplicationId, NetworkError, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A unit of background work.
pub type Job = BoxFuture<'static, ()>;

struct QueueState {
    backlog: VecDeque<Job>,
    sender: Option<UnboundedSender<Job>>,
}

/// Worker pool with a configuration gate in front of it.
pub struct TaskQueue {
    app_config: Arc<AppConfig>,
    state: Mutex<QueueState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Spawn `worker_count` workers on the current Tokio runtime.
    ///
    /// # Errors
    /// `NetworkError::Unsupported` when called outside a Tokio runtime or
    /// with zero workers.
    pub fn new(worker_count: usize, app_config: Arc<AppConfig>) -> Result<Self> {
        if worker_count == 0 {
            return Err(NetworkError::unsupported("task queue needs at least one worker"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            NetworkError::unsupported(format!("task queue requires a Tokio runtime: {e}"))
        })?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..worker_count)
            .map(|worker| runtime.spawn(worker_loop(worker, Arc::clone(&receiver))))
            .collect();

        debug!(worker_count, configured = app_config.is_configured(), "task queue started");

        Ok(Self {
            app_config,
            state: Mutex::new(QueueState { backlog: VecDeque::new(), sender: Some(sender) }),
            workers: Mutex::new(workers),
        })
    }

    pub fn app_config(&self) -> &Arc<AppConfig> {
        &self.app_config
    }

    /// Dispatch `job` now if the gate is open or `force` is set, otherwise
    /// hold it until an application id is configured.
    pub fn submit(&self, job: Job, force: bool) {
        let mut state = self.state.lock();

        if self.app_config.is_configured() {
            // The id may have been set on the shared cell directly.
            let released = release_backlog(&mut state);
            if released > 0 {
                info!(released, "application id found on submit; backlog released");
            }
            dispatch(&state, job);
        } else if force {
            dispatch(&state, job);
        } else {
            state.backlog.push_back(job);
            debug!(backlog = state.backlog.len(), "application id not set; job deferred");
        }
    }

    /// Run `task` in the background and report its outcome to `listener`.
    pub fn submit_task<T>(&self, task: T, listener: Arc<dyn Listener<T::Output>>, force: bool)
    where
        T: Task,
    {
        let completion = Completion::new(listener);
        let job = async move {
            let result = task.run().await;
            completion.finish(result);
        };
        self.submit(job.boxed(), force);
    }

    /// Validate and store the application id, then release the backlog in
    /// submission order.
    ///
    /// # Errors
    /// `NetworkError::InvalidApplicationId` if `application_id` is malformed;
    /// the gate stays as it was.
    pub fn set_application_id(&self, application_id: &str) -> Result<ApplicationId> {
        let id = ApplicationId::parse(application_id)?;

        let mut state = self.state.lock();
        let previous = self.app_config.set_application_id(id.clone());
        let released = release_backlog(&mut state);

        info!(
            application_id = %id,
            replaced = previous.is_some(),
            released,
            "application id configured"
        );
        Ok(id)
    }

    /// Jobs waiting for the application id.
    pub fn backlog_len(&self) -> usize {
        self.state.lock().backlog.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().sender.is_none()
    }

    /// Stop accepting work, drop the backlog and wait up to `timeout` for
    /// in-flight jobs. Returns `false` if workers had to be aborted.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let (backlog, sender) = {
            let mut state = self.state.lock();
            (std::mem::take(&mut state.backlog), state.sender.take())
        };
        if !backlog.is_empty() {
            warn!(dropped = backlog.len(), "task queue shut down with deferred jobs");
        }
        drop(backlog);
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();

        match tokio::time::timeout(timeout, futures::future::join_all(workers)).await {
            Ok(_) => {
                info!("task queue stopped");
                true
            }
            Err(_) => {
                warn!(?timeout, "task queue workers did not finish in time; aborting");
                for handle in aborts {
                    handle.abort();
                }
                false
            }
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TaskQueue")
            .field("configured", &self.app_config.is_configured())
            .field("backlog", &state.backlog.len())
            .field("shut_down", &state.sender.is_none())
            .field("workers", &self.workers.lock().len())
            .finish()
    }
}

fn dispatch(state: &QueueState, job: Job) {
    match &state.sender {
        Some(sender) => {
            if sender.send(job).is_err() {
                error!("task queue workers are gone; job dropped");
            }
        }
        None => warn!("task queue is shut down; job dropped"),
    }
}

/// Dispatch every deferred job in submission order.
fn release_backlog(state: &mut QueueState) -> usize {
    let released = state.backlog.len();
    while let Some(job) = state.backlog.pop_front() {
        dispatch(state, job);
    }
    released
}

async fn worker_loop(worker: usize, receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<Job>>>) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else { break };

        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            error!(worker, "task panicked");
        }
    }
    debug!(worker, "task queue worker exiting");
}

/// Delivers a task outcome to its listener exactly once. Dropping it
/// undelivered reports a cancellation.
struct Completion<T> {
    listener: Option<Arc<dyn Listener<T>>>,
}

impl<T> Completion<T> {
    fn new(listener: Arc<dyn Listener<T>>) -> Self {
        Self { listener: Some(listener) }
    }

    fn finish(mut self, result: Result<T>) {
        if let Some(listener) = self.listener.take() {
            match result {
                Ok(value) => listener.on_complete(value),
                Err(error) => listener.on_error(error),
            }
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.on_error(NetworkError::transport("task cancelled before completion"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    struct Record(u32, Arc<Mutex<Vec<u32>>>);

    #[async_trait]
    impl Task for Record {
        type Output = u32;

        async fn run(self) -> Result<u32> {
            self.1.lock().push(self.0);
            Ok(self.0)
        }
    }

    struct Fail;

    #[async_trait]
    impl Task for Fail {
        type Output = u32;

        async fn run(self) -> Result<u32> {
            Err(NetworkError::HttpStatus { status_code: 404 })
        }
    }

    struct Panic;

    #[async_trait]
    impl Task for Panic {
        type Output = u32;

        #[allow(clippy::panic)]
        async fn run(self) -> Result<u32> {
            panic!("task blew up")
        }
    }

    #[derive(Default)]
    struct Outcomes {
        completed: Mutex<Vec<u32>>,
        errors: Mutex<Vec<NetworkError>>,
        calls: AtomicUsize,
        notify: Notify,
    }

    impl Outcomes {
        async fn wait_for(&self, calls: usize) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while self.calls.load(Ordering::SeqCst) < calls {
                    self.notify.notified().await;
                }
            })
            .await
            .expect("listener was not called in time");
        }
    }

    impl Listener<u32> for Outcomes {
        fn on_complete(&self, value: u32) {
            self.completed.lock().push(value);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }

        fn on_error(&self, error: NetworkError) {
            self.errors.lock().push(error);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    fn queue() -> TaskQueue {
        TaskQueue::new(1, Arc::new(AppConfig::new())).unwrap()
    }

    #[tokio::test]
    async fn test_id_set_on_shared_config_releases_backlog_before_new_jobs() {
        let config = Arc::new(AppConfig::new());
        let queue = TaskQueue::new(1, Arc::clone(&config)).unwrap();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let outcomes = Arc::new(Outcomes::default());

        queue.submit_task(Record(1, Arc::clone(&ran)), outcomes.clone(), false);
        config.set_application_id(ApplicationId::parse("app-abc").unwrap());
        queue.submit_task(Record(2, Arc::clone(&ran)), outcomes.clone(), false);
        outcomes.wait_for(2).await;

        assert_eq!(*ran.lock(), vec![1, 2]);
        assert_eq!(queue.backlog_len(), 0);
    }

    #[tokio::test]
    async fn test_jobs_wait_for_application_id_then_run_in_order() {
        let queue = queue();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let outcomes = Arc::new(Outcomes::default());

        for n in 1..=3 {
            queue.submit_task(Record(n, Arc::clone(&ran)), outcomes.clone(), false);
        }
        tokio::task::yield_now().await;
        assert_eq!(queue.backlog_len(), 3);
        assert!(ran.lock().is_empty());

        queue.set_application_id("app-123").unwrap();
        outcomes.wait_for(3).await;

        assert_eq!(*ran.lock(), vec![1, 2, 3]);
        assert_eq!(*outcomes.completed.lock(), vec![1, 2, 3]);
        assert_eq!(queue.backlog_len(), 0);
    }

    #[tokio::test]
    async fn test_forced_job_bypasses_gate() {
        let queue = queue();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let outcomes = Arc::new(Outcomes::default());

        queue.submit_task(Record(1, Arc::clone(&ran)), outcomes.clone(), false);
        queue.submit_task(Record(2, Arc::clone(&ran)), outcomes.clone(), true);
        outcomes.wait_for(1).await;

        assert_eq!(*ran.lock(), vec![2]);
        assert_eq!(queue.backlog_len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_application_id_keeps_gate_closed() {
        let queue = queue();
        queue.submit(async {}.boxed(), false);

        let err = queue.set_application_id("bad id!").unwrap_err();

        assert!(matches!(err, NetworkError::InvalidApplicationId { .. }));
        assert!(!queue.app_config().is_configured());
        assert_eq!(queue.backlog_len(), 1);
    }

    #[tokio::test]
    async fn test_errors_and_panics_reach_listener_once() {
        let queue = queue();
        queue.set_application_id("app-123").unwrap();
        let outcomes = Arc::new(Outcomes::default());

        queue.submit_task(Fail, outcomes.clone(), false);
        queue.submit_task(Panic, outcomes.clone(), false);
        outcomes.wait_for(2).await;

        let errors = outcomes.errors.lock();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], NetworkError::HttpStatus { status_code: 404 });
        assert!(matches!(errors[1], NetworkError::Transport { .. }));
        assert!(outcomes.completed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_deferred_tasks() {
        let queue = queue();
        let outcomes = Arc::new(Outcomes::default());
        queue.submit_task(Fail, outcomes.clone(), false);

        assert!(queue.shutdown(Duration::from_secs(1)).await);
        outcomes.wait_for(1).await;

        assert!(queue.is_shut_down());
        assert!(matches!(outcomes.errors.lock()[0], NetworkError::Transport { .. }));

        queue.submit_task(Fail, outcomes.clone(), true);
        outcomes.wait_for(2).await;
        assert_eq!(outcomes.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_requires_runtime_and_workers() {
        assert!(TaskQueue::new(1, Arc::new(AppConfig::new())).is_err());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        assert!(TaskQueue::new(0, Arc::new(AppConfig::new())).is_err());
    }
}

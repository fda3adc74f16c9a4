//! The task executor's owner loop (§4.3, §5): enforces at-most-one running
//! deployment task per device, queues additional submissions for a busy
//! device in submit order, coalesces a resubmission of the same task while
//! it's outstanding (running or queued), and enforces each task's own
//! timeout with cooperative cancellation.
//!
//! Structured the same way as [`crate::device`]'s owner loop: an inbox the
//! owner alone drains, multiplexed here against a second channel that
//! spawned task futures use to report back when they finish.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use orc_protocol::{DeployHistoryEntry, DeviceId, Kind, OrcError, OrcResult, State, TaskId, TaskStatus};

use crate::deploy_history::DeployHistory;
use crate::notifications::NotificationBus;
use crate::tasks::DeploymentTask;

enum ExecutorCommand {
    Submit {
        task: Arc<dyn DeploymentTask>,
        reply: oneshot::Sender<OrcResult<()>>,
    },
    CancelForDevice {
        device_id: DeviceId,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

struct RunningTask {
    task_id: TaskId,
    cancel: CancellationToken,
}

/// A distinct task waiting for `device_id`'s running slot to free up, kept
/// in submit order (§4.3 "ordered queue", §5 ordering guarantee (ii)).
struct QueuedTask {
    task: Arc<dyn DeploymentTask>,
    task_id: TaskId,
}

struct Completion {
    device_id: DeviceId,
}

/// Cheaply-cloneable front for the executor's owner loop.
#[derive(Clone)]
pub struct TaskExecutorHandle {
    inbox: mpsc::Sender<ExecutorCommand>,
}

impl TaskExecutorHandle {
    /// Accept `task` for execution. Coalesces with an already-outstanding
    /// task of the same [`TaskId`] — whether it's currently running or
    /// still queued — by returning `Ok(())` without enqueuing a duplicate.
    /// A *different* task for a device that's already running one is
    /// queued behind it rather than rejected (§4.3: "Maintains an ordered
    /// queue... Single cooperative loop pulls next queued task whose
    /// device is idle").
    pub async fn submit(&self, task: Arc<dyn DeploymentTask>) -> OrcResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(ExecutorCommand::Submit {
                task,
                reply: reply_tx,
            })
            .await
            .map_err(|_| gone())?;
        reply_rx.await.map_err(|_| gone())?
    }

    /// Cancel whatever task is currently running for `device_id`, if any
    /// (§4.1, §8 scenario 6: "MQTT disconnect cancels in-flight task" —
    /// the session bridge calls this in the same beat it demotes the
    /// device's `ConnectionState`, so the task's own `run` observes
    /// `cancel.cancelled()` at its next suspension point rather than
    /// hanging until its outer timeout). A no-op if nothing is running.
    pub async fn cancel_for_device(&self, device_id: DeviceId) {
        let _ = self.inbox.send(ExecutorCommand::CancelForDevice { device_id }).await;
    }

    /// §4.3 Termination: cancel every running task cooperatively and fail
    /// every queued task with reason "externally stopped". Submissions
    /// made after this returns are rejected.
    pub async fn stop(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.inbox.send(ExecutorCommand::Stop { reply: reply_tx }).await.is_ok() {
            let _ = reply_rx.await;
        }
    }
}

fn gone() -> OrcError {
    OrcError::new(
        Kind::InternalInvariantViolation,
        "task executor owner loop is gone",
    )
}

fn executor_stopped() -> OrcError {
    OrcError::new(
        Kind::ExternalDeploymentFailed,
        "task executor has been stopped",
    )
}

pub fn spawn(history: Arc<DeployHistory>, notifications: NotificationBus) -> (TaskExecutorHandle, JoinHandle<()>) {
    let (inbox_tx, inbox_rx) = mpsc::channel(64);
    let handle = TaskExecutorHandle { inbox: inbox_tx };
    let join = tokio::spawn(run(inbox_rx, history, notifications));
    (handle, join)
}

async fn run(
    mut inbox: mpsc::Receiver<ExecutorCommand>,
    history: Arc<DeployHistory>,
    notifications: NotificationBus,
) {
    let mut running: HashMap<DeviceId, RunningTask> = HashMap::new();
    let mut queues: HashMap<DeviceId, VecDeque<QueuedTask>> = HashMap::new();
    let mut stopped = false;
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel::<Completion>();

    loop {
        tokio::select! {
            cmd = inbox.recv() => {
                match cmd {
                    Some(ExecutorCommand::Submit { task, reply }) => {
                        if stopped {
                            let _ = reply.send(Err(executor_stopped()));
                            continue;
                        }
                        handle_submit(&mut running, &mut queues, task, reply, &history, &notifications, completion_tx.clone());
                    }
                    Some(ExecutorCommand::CancelForDevice { device_id }) => {
                        if let Some(running_task) = running.get(&device_id) {
                            running_task.cancel.cancel();
                        }
                    }
                    Some(ExecutorCommand::Stop { reply }) => {
                        for running_task in running.values() {
                            running_task.cancel.cancel();
                        }
                        for (device_id, queue) in queues.drain() {
                            for queued in queue {
                                fail_queued(queued, device_id, "externally stopped", &history, &notifications);
                            }
                        }
                        stopped = true;
                        let _ = reply.send(());
                    }
                    None => break,
                }
            }
            Some(completion) = completion_rx.recv() => {
                running.remove(&completion.device_id);
                if let Some(next) = queues.get_mut(&completion.device_id).and_then(|q| q.pop_front()) {
                    if queues.get(&completion.device_id).is_some_and(|q| q.is_empty()) {
                        queues.remove(&completion.device_id);
                    }
                    start_task(&mut running, next.task, &history, &notifications, completion_tx.clone());
                }
            }
        }
    }
    tracing::info!("task executor owner loop exiting, inbox closed");
}

fn handle_submit(
    running: &mut HashMap<DeviceId, RunningTask>,
    queues: &mut HashMap<DeviceId, VecDeque<QueuedTask>>,
    task: Arc<dyn DeploymentTask>,
    reply: oneshot::Sender<OrcResult<()>>,
    history: &Arc<DeployHistory>,
    notifications: &NotificationBus,
    completion_tx: mpsc::UnboundedSender<Completion>,
) {
    let device_id = task.device_id();
    let task_id = task.id();

    if let Some(existing) = running.get(&device_id) {
        if existing.task_id == task_id {
            // Already outstanding — coalesce rather than start a duplicate.
            let _ = reply.send(Ok(()));
            return;
        }

        let queue = queues.entry(device_id).or_default();
        if queue.iter().any(|queued| queued.task_id == task_id) {
            // Already waiting behind the running task — coalesce.
            let _ = reply.send(Ok(()));
            return;
        }
        queue.push_back(QueuedTask { task, task_id });
        let _ = reply.send(Ok(()));
        return;
    }

    let _ = reply.send(Ok(()));
    start_task(running, task, history, notifications, completion_tx);
}

fn start_task(
    running: &mut HashMap<DeviceId, RunningTask>,
    task: Arc<dyn DeploymentTask>,
    history: &Arc<DeployHistory>,
    notifications: &NotificationBus,
    completion_tx: mpsc::UnboundedSender<Completion>,
) {
    let device_id = task.device_id();
    let task_id = task.id();

    let cancel = CancellationToken::new();
    running.insert(
        device_id,
        RunningTask {
            task_id: task_id.clone(),
            cancel: cancel.clone(),
        },
    );

    let timeout = task.timeout();
    let kind = task.kind();
    let history = history.clone();
    let notifications = notifications.clone();
    let started_at = chrono::Utc::now();
    let deploy_id = uuid::Uuid::new_v4().to_string();

    notifications.publish(orc_protocol::Notification::TaskStarted {
        device_id,
        task_kind: kind,
        task_id: task_id.to_string(),
        at: started_at,
    });

    tokio::spawn(async move {
        let device_handle = task.device_handle();
        let outcome = tokio::time::timeout(timeout, task.run(cancel.clone())).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                // `run`'s future is abandoned here without ever reaching its
                // own end-of-run transition (§4.3), so the executor forces
                // the device out of its `*Deploying` state itself: back to
                // `Ready` if `stop()` succeeded, `Error` if it didn't.
                match task.stop().await {
                    Ok(()) => {
                        let _ = device_handle.transition(State::Ready).await;
                    }
                    Err(stop_err) => {
                        let _ = device_handle
                            .transition(State::Error {
                                reason: stop_err.message.clone(),
                            })
                            .await;
                    }
                }
                Err(OrcError::deployment_timeout(format!(
                    "{task_id} exceeded its {:?} timeout",
                    timeout
                )))
            }
        };

        let status = if result.is_ok() {
            TaskStatus::Success
        } else {
            TaskStatus::Error
        };
        let error = result.as_ref().err().map(|e| e.message.clone());

        history.record(DeployHistoryEntry {
            deploy_id,
            config_id: None,
            started_at,
            task_kind: kind,
            device_id,
            status,
            error: error.clone(),
        });

        notifications.publish(orc_protocol::Notification::TaskFinished {
            device_id,
            task_kind: kind,
            task_id: task_id.to_string(),
            status,
            error,
            at: chrono::Utc::now(),
        });

        let _ = completion_tx.send(Completion { device_id });
    });
}

/// Records a queued-but-never-run task as `Error(reason)` directly, with no
/// `TaskStarted` notification — it never started (§4.3 Termination).
fn fail_queued(
    queued: QueuedTask,
    device_id: DeviceId,
    reason: &str,
    history: &Arc<DeployHistory>,
    notifications: &NotificationBus,
) {
    let kind = queued.task.kind();
    let task_id = queued.task_id;
    let error = reason.to_string();
    let at = chrono::Utc::now();

    history.record(DeployHistoryEntry {
        deploy_id: uuid::Uuid::new_v4().to_string(),
        config_id: None,
        started_at: at,
        task_kind: kind,
        device_id,
        status: TaskStatus::Error,
        error: Some(error.clone()),
    });

    notifications.publish(orc_protocol::Notification::TaskFinished {
        device_id,
        task_kind: kind,
        task_id: task_id.to_string(),
        status: TaskStatus::Error,
        error: Some(error),
        at,
    });
}

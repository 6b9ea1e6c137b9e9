//! Interpreter that runs a [`Flow`] machine.
//!
//! One `FlowService` is one machine instance. Transitions are serialized
//! behind a lock; the service call runs on a spawned Tokio task and feeds its
//! result back as an internal event. Dropping the service tears the instance
//! down: the task is aborted and a result that still arrives is ignored, so
//! no session side effect happens after teardown.

use crate::api::{ApiClient, ApiError};
use crate::error::{ErrorPayload, UNKNOWN_ERROR};
use crate::flow::{transition, Effect, Flow, FlowContext, FlowEvent, FlowNotification, FlowState, Transition};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

const NOTIFICATION_CAPACITY: usize = 16;

/// State and context of a flow instance at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub context: FlowContext,
}

type SnapshotListener = Arc<dyn Fn(&FlowSnapshot) + Send + Sync>;

struct Machine {
    snapshot: FlowSnapshot,
    task: Option<JoinHandle<()>>,
    torn_down: bool,
}

struct FlowShared<F: Flow> {
    flow: F,
    api: ApiClient,
    instance_id: Uuid,
    machine: Mutex<Machine>,
    snapshots: watch::Sender<FlowSnapshot>,
    notifications: broadcast::Sender<FlowNotification>,
    listeners: Mutex<Vec<SnapshotListener>>,
}

/// A running flow instance.
///
/// Methods that send requests must be called from within a Tokio runtime.
pub struct FlowService<F: Flow> {
    shared: Arc<FlowShared<F>>,
}

impl<F: Flow> FlowService<F> {
    pub fn new(flow: F, api: ApiClient) -> Self {
        let (snapshots, _) = watch::channel(FlowSnapshot::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            shared: Arc::new(FlowShared {
                flow,
                api,
                instance_id: Uuid::new_v4(),
                machine: Mutex::new(Machine {
                    snapshot: FlowSnapshot::default(),
                    task: None,
                    torn_down: false,
                }),
                snapshots,
                notifications,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Send a request to the machine.
    ///
    /// Returns `false` if it was dropped because a request is already in
    /// flight.
    pub fn send(&self, request: F::Request) -> bool {
        let changed = {
            let mut machine = self.shared.machine.lock();
            if machine.torn_down {
                return false;
            }
            if machine.snapshot.state.is_requesting() {
                debug!(
                    flow = self.shared.flow.name(),
                    instance = %self.shared.instance_id,
                    "Dropping request while another is in flight"
                );
                return false;
            }

            let next = transition(
                &self.shared.flow,
                &machine.snapshot.state,
                &machine.snapshot.context,
                FlowEvent::Request(request),
            );
            FlowShared::apply(&self.shared, &mut machine, next)
        };

        self.shared.notify_listeners(&changed);
        true
    }

    /// Send a request and wait until the machine settles.
    pub async fn request(&self, request: F::Request) -> FlowSnapshot {
        let mut snapshots = self.shared.snapshots.subscribe();
        self.send(request);

        let settled = match snapshots.wait_for(|s| !s.state.is_requesting()).await {
            Ok(snapshot) => Some(snapshot.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.snapshot())
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.shared.machine.lock().snapshot.clone()
    }

    pub fn state(&self) -> FlowState {
        self.snapshot().state
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<FlowSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Receiver of success/error notifications, in emission order.
    pub fn notifications(&self) -> broadcast::Receiver<FlowNotification> {
        self.shared.notifications.subscribe()
    }

    /// Call `listener` with every new snapshot.
    pub fn subscribe<L>(&self, listener: L)
    where
        L: Fn(&FlowSnapshot) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().push(Arc::new(listener));
    }

    pub fn api(&self) -> &ApiClient {
        &self.shared.api
    }
}

impl<F: Flow> Drop for FlowService<F> {
    fn drop(&mut self) {
        let mut machine = self.shared.machine.lock();
        machine.torn_down = true;
        if let Some(task) = machine.task.take() {
            task.abort();
            debug!(
                flow = self.shared.flow.name(),
                instance = %self.shared.instance_id,
                "Aborted in-flight request on teardown"
            );
        }
    }
}

impl<F: Flow> FlowShared<F> {
    /// Commit a transition and run its effects. Returns the new snapshot.
    fn apply(
        shared: &Arc<Self>,
        machine: &mut Machine,
        next: Transition<F::Request>,
    ) -> FlowSnapshot {
        let old_label = machine.snapshot.state.label();
        machine.snapshot = FlowSnapshot {
            state: next.state,
            context: next.context,
        };
        debug!(
            flow = shared.flow.name(),
            instance = %shared.instance_id,
            old_state = old_label,
            new_state = machine.snapshot.state.label(),
            "Flow transition"
        );
        shared.snapshots.send_replace(machine.snapshot.clone());

        for effect in next.effects {
            match effect {
                Effect::Invoke(request) => {
                    let task_shared = Arc::clone(shared);
                    machine.task = Some(tokio::spawn(async move {
                        let call = task_shared.flow.call(&task_shared.api, request);
                        // A panicking call still has to settle the machine
                        let result = match AssertUnwindSafe(call).catch_unwind().await {
                            Ok(result) => result,
                            Err(_) => {
                                error!(
                                    flow = task_shared.flow.name(),
                                    instance = %task_shared.instance_id,
                                    "Flow request panicked"
                                );
                                Err(ApiError::Failure(ErrorPayload::backend(
                                    UNKNOWN_ERROR,
                                    "Request failed unexpectedly",
                                    None,
                                )))
                            }
                        };
                        task_shared.resolve(result);
                    }));
                }
                Effect::Emit(notification) => {
                    // No receivers is not an error
                    let _ = shared.notifications.send(notification);
                }
            }
        }

        machine.snapshot.clone()
    }

    /// Feed the settled service call back into the machine.
    fn resolve(self: &Arc<Self>, result: Result<F::Response, ApiError>) {
        let changed = {
            let mut machine = self.machine.lock();
            if machine.torn_down || !machine.snapshot.state.is_requesting() {
                debug!(
                    flow = self.flow.name(),
                    instance = %self.instance_id,
                    "Ignoring late resolution"
                );
                return;
            }
            machine.task = None;

            let session = self.api.session();
            let event = match result {
                Ok(response) => match self.flow.on_success(session, response) {
                    Ok(()) => FlowEvent::ResolvedOk,
                    Err(payload) => FlowEvent::ResolvedErr(payload),
                },
                Err(ApiError::Failure(payload)) => {
                    self.flow.on_failure(session);
                    FlowEvent::ResolvedErr(payload)
                }
                Err(ApiError::Session(error)) => {
                    self.flow.on_failure(session);
                    FlowEvent::SessionLost(error)
                }
            };

            let next = transition(
                &self.flow,
                &machine.snapshot.state,
                &machine.snapshot.context,
                event,
            );
            Self::apply(self, &mut machine, next)
        };

        self.notify_listeners(&changed);
    }

    fn notify_listeners(&self, snapshot: &FlowSnapshot) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

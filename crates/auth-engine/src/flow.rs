//! Generic request/response flow machine.
//!
//! Every auth operation is the same two-state machine:
//!
//! ```text
//!                 Request (valid)
//!   ┌──────────┐ ───────────────► ┌────────────┐
//!   │ Idle(..) │                  │ Requesting │
//!   └──────────┘ ◄─────────────── └────────────┘
//!        ▲ │      ResolvedOk / ResolvedErr / SessionLost
//!        └─┘
//!   Request (invalid)
//! ```
//!
//! [`transition`] is pure: it returns the next state and the effects to run.
//! The async half lives in [`crate::service::FlowService`].

use crate::api::{ApiClient, ApiError};
use crate::error::{ErrorPayload, SessionError};
use crate::session::SessionContext;
use async_trait::async_trait;
use serde::Serialize;

/// Outcome of the last settled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Status {
    Initial,
    Success,
    Error(ErrorPayload),
    /// The session was lost while the request needed it.
    SignInRequired,
}

/// State of one flow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle(Status),
    Requesting,
}

impl FlowState {
    pub fn is_requesting(&self) -> bool {
        matches!(self, FlowState::Requesting)
    }

    /// Returns true once a request has settled, whatever the outcome.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            FlowState::Idle(Status::Success | Status::Error(_) | Status::SignInRequired)
        )
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            FlowState::Idle(Status::Initial) => "idle.initial",
            FlowState::Idle(Status::Success) => "idle.success",
            FlowState::Idle(Status::Error(_)) => "idle.error",
            FlowState::Idle(Status::SignInRequired) => "idle.sign_in_required",
            FlowState::Requesting => "requesting",
        }
    }
}

impl Default for FlowState {
    fn default() -> Self {
        FlowState::Idle(Status::Initial)
    }
}

/// Per-instance context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowContext {
    pub error: Option<ErrorPayload>,
}

/// Inputs to [`transition`].
///
/// Only `Request` comes from callers; the rest are fed back by the
/// interpreter when the service call settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent<R> {
    Request(R),
    ResolvedOk,
    ResolvedErr(ErrorPayload),
    SessionLost(SessionError),
}

/// Broadcast to observers when a request settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowNotification {
    Success,
    Error(ErrorPayload),
    SignInRequired(SessionError),
}

/// Work the interpreter must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect<R> {
    /// Run the flow's service call with this request.
    Invoke(R),
    Emit(FlowNotification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<R> {
    pub state: FlowState,
    pub context: FlowContext,
    pub effects: Vec<Effect<R>>,
}

impl<R> Transition<R> {
    fn unchanged(state: &FlowState, context: &FlowContext) -> Self {
        Self {
            state: state.clone(),
            context: context.clone(),
            effects: Vec::new(),
        }
    }

    fn settle(status: Status, error: Option<ErrorPayload>, notification: FlowNotification) -> Self {
        Self {
            state: FlowState::Idle(status),
            context: FlowContext { error },
            effects: vec![Effect::Emit(notification)],
        }
    }
}

/// One auth operation: its guard, its service call and its session effect.
#[async_trait]
pub trait Flow: Send + Sync + 'static {
    type Request: Send + Sync + 'static;
    type Response: Send + 'static;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Synchronous guard run before any I/O.
    fn validate(&self, request: &Self::Request) -> Result<(), ErrorPayload>;

    /// The service call. Invoked at most once per accepted request.
    async fn call(&self, api: &ApiClient, request: Self::Request) -> Result<Self::Response, ApiError>;

    /// Apply the result to the session. A returned error fails the request.
    fn on_success(&self, _session: &SessionContext, _response: Self::Response) -> Result<(), ErrorPayload> {
        Ok(())
    }

    /// Called when the service call failed, before the failure is recorded.
    fn on_failure(&self, _session: &SessionContext) {}
}

/// Compute the next state of a flow instance.
pub fn transition<F: Flow>(
    flow: &F,
    state: &FlowState,
    context: &FlowContext,
    event: FlowEvent<F::Request>,
) -> Transition<F::Request> {
    match (state, event) {
        (FlowState::Idle(_), FlowEvent::Request(request)) => match flow.validate(&request) {
            Ok(()) => Transition {
                state: FlowState::Requesting,
                context: FlowContext::default(),
                effects: vec![Effect::Invoke(request)],
            },
            Err(payload) => Transition::settle(
                Status::Error(payload.clone()),
                Some(payload.clone()),
                FlowNotification::Error(payload),
            ),
        },
        (FlowState::Requesting, FlowEvent::Request(_)) => Transition::unchanged(state, context),
        (FlowState::Requesting, FlowEvent::ResolvedOk) => {
            Transition::settle(Status::Success, None, FlowNotification::Success)
        }
        (FlowState::Requesting, FlowEvent::ResolvedErr(payload)) => Transition::settle(
            Status::Error(payload.clone()),
            Some(payload.clone()),
            FlowNotification::Error(payload),
        ),
        (FlowState::Requesting, FlowEvent::SessionLost(error)) => Transition::settle(
            Status::SignInRequired,
            None,
            FlowNotification::SignInRequired(error),
        ),
        // Late resolution of a request this instance no longer waits for
        (
            FlowState::Idle(_),
            FlowEvent::ResolvedOk | FlowEvent::ResolvedErr(_) | FlowEvent::SessionLost(_),
        ) => Transition::unchanged(state, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, INVALID_PASSWORD, INVALID_TICKET};

    struct Probe;

    #[async_trait]
    impl Flow for Probe {
        type Request = &'static str;
        type Response = ();

        fn name(&self) -> &'static str {
            "probe"
        }

        fn validate(&self, request: &Self::Request) -> Result<(), ErrorPayload> {
            if request.len() >= 3 {
                Ok(())
            } else {
                Err(ErrorPayload::invalid_password())
            }
        }

        async fn call(&self, _api: &ApiClient, _request: Self::Request) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn idle() -> (FlowState, FlowContext) {
        (FlowState::default(), FlowContext::default())
    }

    #[test]
    fn test_initial_state() {
        let (state, context) = idle();
        assert_eq!(state, FlowState::Idle(Status::Initial));
        assert!(context.error.is_none());
        assert_eq!(state.label(), "idle.initial");
    }

    #[test]
    fn test_valid_request_invokes_service() {
        let (state, context) = idle();
        let next = transition(&Probe, &state, &context, FlowEvent::Request("good"));
        assert_eq!(next.state, FlowState::Requesting);
        assert_eq!(next.effects, vec![Effect::Invoke("good")]);
    }

    #[test]
    fn test_invalid_request_stays_idle_with_error() {
        let (state, context) = idle();
        let next = transition(&Probe, &state, &context, FlowEvent::Request("ab"));

        let error = next.context.error.clone().unwrap();
        assert_eq!(error.kind(), INVALID_PASSWORD);
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert_eq!(next.state, FlowState::Idle(Status::Error(error.clone())));
        // No invoke effect
        assert_eq!(
            next.effects,
            vec![Effect::Emit(FlowNotification::Error(error))]
        );
    }

    #[test]
    fn test_request_while_requesting_is_ignored() {
        let context = FlowContext::default();
        let next = transition(&Probe, &FlowState::Requesting, &context, FlowEvent::Request("good"));
        assert_eq!(next.state, FlowState::Requesting);
        assert!(next.effects.is_empty());
    }

    #[test]
    fn test_new_request_resets_error() {
        let error = ErrorPayload::backend(INVALID_TICKET, "bad", Some(401));
        let state = FlowState::Idle(Status::Error(error.clone()));
        let context = FlowContext { error: Some(error) };

        let next = transition(&Probe, &state, &context, FlowEvent::Request("good"));
        assert_eq!(next.state, FlowState::Requesting);
        assert!(next.context.error.is_none());
    }

    #[test]
    fn test_resolutions() {
        let context = FlowContext::default();

        let ok = transition(&Probe, &FlowState::Requesting, &context, FlowEvent::ResolvedOk);
        assert_eq!(ok.state, FlowState::Idle(Status::Success));
        assert!(ok.context.error.is_none());
        assert_eq!(ok.effects, vec![Effect::Emit(FlowNotification::Success)]);

        let payload = ErrorPayload::backend(INVALID_TICKET, "bad", Some(401));
        let err = transition(
            &Probe,
            &FlowState::Requesting,
            &context,
            FlowEvent::ResolvedErr(payload.clone()),
        );
        assert_eq!(err.state, FlowState::Idle(Status::Error(payload.clone())));
        assert_eq!(err.context.error, Some(payload));

        let lost = transition(
            &Probe,
            &FlowState::Requesting,
            &context,
            FlowEvent::SessionLost(SessionError::Unauthenticated),
        );
        assert_eq!(lost.state, FlowState::Idle(Status::SignInRequired));
        assert!(lost.context.error.is_none());
        assert_eq!(
            lost.effects,
            vec![Effect::Emit(FlowNotification::SignInRequired(
                SessionError::Unauthenticated
            ))]
        );
    }

    #[test]
    fn test_stale_resolution_in_idle_is_ignored() {
        let state = FlowState::Idle(Status::Success);
        let context = FlowContext::default();
        let next = transition(
            &Probe,
            &state,
            &context,
            FlowEvent::ResolvedErr(ErrorPayload::transport("late")),
        );
        assert_eq!(next.state, state);
        assert!(next.context.error.is_none());
        assert!(next.effects.is_empty());
    }

    #[test]
    fn test_state_serializes_for_display() {
        let state = FlowState::Idle(Status::Error(ErrorPayload::invalid_email()));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["idle"]["status"], "error");
        assert_eq!(json["idle"]["error"]["kind"], "invalid-email");
    }
}

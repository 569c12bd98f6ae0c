//! Passcode entry with a retry limit.
//!
//! Entering a passcode moves the screen to `Verifying`, which makes the
//! `verify` loop ask the [`AuthService`]. Each wrong passcode counts as one
//! attempt; reaching `max_attempts` locks the screen for good.

use crate::repository::{AuthService, RepositoryError, Session};
use feedloop_core::{Effect, FeedbackLoop, Reducer};
use std::sync::Arc;

/// Settings for the passcode screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    /// Wrong passcodes allowed before locking out (default: 5).
    pub max_attempts: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthAction {
    #[default]
    EnteringPasscode,
    Verifying,
    Authorized,
    /// Terminal: nothing but a new screen leaves this.
    LockedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub config: AuthConfig,
    /// The passcode being verified.
    pub passcode: Option<String>,
    pub attempts: u32,
    pub session: Option<Session>,
    /// Last verification error that did not count as an attempt.
    pub last_error: Option<RepositoryError>,
    pub action: AuthAction,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Self {
        AuthState {
            config,
            passcode: None,
            attempts: 0,
            session: None,
            last_error: None,
            action: AuthAction::EnteringPasscode,
        }
    }

    pub fn attempts_left(&self) -> u32 {
        self.config.max_attempts.saturating_sub(self.attempts)
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new(AuthConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    PasscodeEntered(String),
    WrongPasscodeEntered,
    PasscodeVerified(Session),
    /// Verification could not be completed, e.g. the service was unreachable.
    VerificationFailed(RepositoryError),
    SignedOut,
}

pub struct AuthReducer;

impl Reducer for AuthReducer {
    type State = AuthState;
    type Event = AuthEvent;

    fn reduce(mut state: AuthState, event: AuthEvent) -> AuthState {
        match (state.action, event) {
            (AuthAction::EnteringPasscode, AuthEvent::PasscodeEntered(passcode)) => {
                state.passcode = Some(passcode);
                state.last_error = None;
                state.action = AuthAction::Verifying;
            }
            (
                AuthAction::EnteringPasscode | AuthAction::Verifying,
                AuthEvent::WrongPasscodeEntered,
            ) => {
                state.attempts += 1;
                state.passcode = None;
                state.action = if state.attempts >= state.config.max_attempts {
                    AuthAction::LockedOut
                } else {
                    AuthAction::EnteringPasscode
                };
            }
            (AuthAction::Verifying, AuthEvent::PasscodeVerified(session)) => {
                state.session = Some(session);
                state.passcode = None;
                state.attempts = 0;
                state.action = AuthAction::Authorized;
            }
            (AuthAction::Verifying, AuthEvent::VerificationFailed(error)) => {
                state.passcode = None;
                state.last_error = Some(error);
                state.action = AuthAction::EnteringPasscode;
            }
            (AuthAction::Authorized, AuthEvent::SignedOut) => {
                state.session = None;
                state.action = AuthAction::EnteringPasscode;
            }
            _ => {}
        }
        state
    }
}

/// Identifies one verification.
///
/// The attempt number takes part in equality, so re-entering the same
/// passcode after a failure is a new verification rather than a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub passcode: String,
    pub attempt: u32,
}

/// The `verify` loop: check the entered passcode while `Verifying`.
pub fn verify(service: Arc<dyn AuthService>) -> FeedbackLoop<AuthState, AuthEvent> {
    FeedbackLoop::new(
        "verify",
        |state: &AuthState| match (state.action, &state.passcode) {
            (AuthAction::Verifying, Some(passcode)) => Some(VerifyRequest {
                passcode: passcode.clone(),
                attempt: state.attempts,
            }),
            _ => None,
        },
        move |request: VerifyRequest| {
            tracing::debug!(attempt = request.attempt, "verifying passcode");
            Effect::perform(service.verify(&request.passcode), |result| match result {
                Ok(session) => AuthEvent::PasscodeVerified(session),
                Err(RepositoryError::WrongPasscode) => AuthEvent::WrongPasscodeEntered,
                Err(error) => AuthEvent::VerificationFailed(error),
            })
        },
    )
}

/// Every loop of the auth module.
pub fn feedback(service: Arc<dyn AuthService>) -> Vec<FeedbackLoop<AuthState, AuthEvent>> {
    vec![verify(service)]
}

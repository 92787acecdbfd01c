// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Auth Handler
//!
//! Owns the OAuth/JWT lifecycle: code exchange, logout, silent refresh and
//! credential persistence. The jwt lives in memory only; the refresh token
//! is kept in the vault.
//!
//! Credentials are always replaced as a pair, in memory and in the vault
//! under one lock. Any unrecoverable failure resets both to "none".
//!
//! Refreshes are single-flight: the backend rotates the refresh token, so
//! a second request with the same token would fail and wipe the pair the
//! first one just stored.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::error::MessagingError;
use crate::api::events::Event;
use crate::network::{ApiError, CorrectiveAction, ErrorCode, ErrorInfo, WebMessagingApi};
use crate::storage::{keys, Vault};

/// Logout attempts, including one retry after a silent refresh.
pub const MAX_LOGOUT_ATTEMPTS: u32 = 2;

/// In-memory credential pair.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthCredentials {
    pub jwt: Option<String>,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("jwt", &self.jwt.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Result of an auth operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failure { code: ErrorCode, message: String },
    /// The operation was cancelled. Never reported to the host as an error.
    Cancelled,
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success)
    }
}

#[derive(Default)]
struct CredentialState {
    current: AuthCredentials,
    /// Bumped whenever the pair is replaced or cleared.
    generation: u64,
}

pub struct AuthHandler {
    api: Arc<dyn WebMessagingApi>,
    vault: Arc<Vault>,
    auto_refresh_token_when_expired: bool,
    credentials: Mutex<CredentialState>,
    refreshing: tokio::sync::Mutex<()>,
    events: mpsc::UnboundedSender<Event>,
    cancellation: Mutex<CancellationToken>,
}

impl AuthHandler {
    /// Creates a handler, restoring a stored refresh token.
    pub fn new(
        api: Arc<dyn WebMessagingApi>,
        vault: Arc<Vault>,
        auto_refresh_token_when_expired: bool,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let refresh_token = vault.auth_refresh_token();
        AuthHandler {
            api,
            vault,
            auto_refresh_token_when_expired,
            credentials: Mutex::new(CredentialState {
                current: AuthCredentials {
                    jwt: None,
                    refresh_token,
                },
                generation: 0,
            }),
            refreshing: tokio::sync::Mutex::new(()),
            events,
            cancellation: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn credentials(&self) -> AuthCredentials {
        self.credentials.lock().current.clone()
    }

    pub fn jwt(&self) -> Option<String> {
        self.credentials.lock().current.jwt.clone()
    }

    pub fn is_authorized(&self) -> bool {
        self.credentials.lock().current.jwt.is_some()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.credentials.lock().current.refresh_token.is_some()
    }

    /// Exchanges an OAuth PKCE code for credentials.
    pub async fn authorize(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> AuthOutcome {
        let cancellation = self.cancellation.lock().clone();
        let result = self
            .cancellable(&cancellation, self.api.authorize(code, redirect_uri, code_verifier))
            .await;

        match result {
            Ok(auth) => {
                self.set_credentials(AuthCredentials {
                    jwt: Some(auth.jwt),
                    refresh_token: auth.refresh_token,
                });
                if let Err(e) = self.vault.set_was_authenticated(true) {
                    error!(error = %e, "failed to persist authenticated flag");
                }
                info!("authorized");
                self.emit(Event::Authorized);
                AuthOutcome::Success
            }
            Err(ApiError::Cancelled) => {
                warn!("authorize cancelled");
                AuthOutcome::Cancelled
            }
            Err(e) => {
                warn!(error = %e, "authorize failed");
                self.clear();
                let message = e.to_string();
                self.emit_error(ErrorCode::AuthFailed, &message, CorrectiveAction::ReAuthenticate);
                AuthOutcome::Failure {
                    code: ErrorCode::AuthFailed,
                    message,
                }
            }
        }
    }

    /// Revokes the authenticated session.
    ///
    /// A 401 with auto-refresh enabled triggers one silent refresh and one
    /// retry. Credentials are cleared when the server confirms with a
    /// `LogoutEvent`, not here.
    pub async fn logout(&self) -> AuthOutcome {
        let Some(mut jwt) = self.jwt() else {
            let message = MessagingError::NotAuthenticated.to_string();
            self.emit_error(ErrorCode::AuthLogoutFailed, &message, CorrectiveAction::ReAuthenticate);
            return AuthOutcome::Failure {
                code: ErrorCode::AuthLogoutFailed,
                message,
            };
        };

        let cancellation = self.cancellation.lock().clone();
        let mut attempt = 1;
        loop {
            let result = self
                .cancellable(&cancellation, self.api.logout_from_authenticated_session(&jwt))
                .await;

            match result {
                Ok(()) => {
                    debug!(attempt, "logout request accepted");
                    return AuthOutcome::Success;
                }
                Err(ApiError::Cancelled) => {
                    warn!("logout cancelled");
                    return AuthOutcome::Cancelled;
                }
                Err(e) if e.is_unauthorized() && !self.auto_refresh_token_when_expired => {
                    let code = ErrorCode::from_code(401);
                    let message = e.to_string();
                    self.emit_error(code, &message, CorrectiveAction::ReAuthenticate);
                    return AuthOutcome::Failure { code, message };
                }
                Err(e) if e.is_unauthorized() && attempt < MAX_LOGOUT_ATTEMPTS => {
                    debug!("logout rejected with 401, refreshing jwt");
                    match self.refresh_token().await {
                        AuthOutcome::Success => {
                            attempt += 1;
                            match self.jwt() {
                                Some(refreshed) => jwt = refreshed,
                                None => {
                                    let message = MessagingError::NotAuthenticated.to_string();
                                    self.emit_error(
                                        ErrorCode::AuthLogoutFailed,
                                        &message,
                                        CorrectiveAction::ReAuthenticate,
                                    );
                                    return AuthOutcome::Failure {
                                        code: ErrorCode::AuthLogoutFailed,
                                        message,
                                    };
                                }
                            }
                        }
                        AuthOutcome::Cancelled => return AuthOutcome::Cancelled,
                        AuthOutcome::Failure { code, message } => {
                            self.emit_error(code, &message, CorrectiveAction::ReAuthenticate);
                            return AuthOutcome::Failure { code, message };
                        }
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "logout failed");
                    let message = e.to_string();
                    let action = e
                        .status()
                        .map(CorrectiveAction::from_code)
                        .unwrap_or(CorrectiveAction::Unknown);
                    self.emit_error(ErrorCode::AuthLogoutFailed, &message, action);
                    return AuthOutcome::Failure {
                        code: ErrorCode::AuthLogoutFailed,
                        message,
                    };
                }
            }
        }
    }

    /// Obtains a fresh jwt using the stored refresh token.
    ///
    /// Fails without any HTTP call when no refresh token is stored or when
    /// silent refresh is disabled.
    pub async fn refresh_token(&self) -> AuthOutcome {
        let cancellation = self.cancellation.lock().clone();
        let seen = self.credentials.lock().generation;
        if let Some(failure) = self.refresh_gate() {
            return failure;
        }

        let _refreshing = tokio::select! {
            guard = self.refreshing.lock() => guard,
            _ = cancellation.cancelled() => {
                warn!("token refresh cancelled");
                return AuthOutcome::Cancelled;
            }
        };

        let (refresh_token, generation) = {
            let state = self.credentials.lock();
            if state.generation != seen && state.current.jwt.is_some() {
                debug!("jwt already refreshed by a concurrent request");
                return AuthOutcome::Success;
            }
            match state.current.refresh_token.clone() {
                Some(token) => (token, state.generation),
                None => return refresh_failure(MessagingError::NoRefreshToken.to_string()),
            }
        };

        let result = self
            .cancellable(&cancellation, self.api.refresh_auth_jwt(&refresh_token))
            .await;

        match result {
            Ok(auth) => {
                let refresh_token = auth.refresh_token.or(Some(refresh_token));
                self.set_credentials(AuthCredentials {
                    jwt: Some(auth.jwt),
                    refresh_token,
                });
                debug!("jwt refreshed");
                AuthOutcome::Success
            }
            Err(ApiError::Cancelled) => {
                warn!("token refresh cancelled");
                AuthOutcome::Cancelled
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                if !self.reset(Some(generation)) {
                    debug!("credentials replaced during refresh, keeping them");
                }
                refresh_failure(e.to_string())
            }
        }
    }

    /// Cancels every auth request in flight.
    pub fn cancel(&self) {
        let mut token = self.cancellation.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Forgets all credentials, in memory and in the vault.
    pub fn clear(&self) {
        self.reset(None);
    }

    /// Clears the pair unless it changed since `expected`. Returns whether
    /// it was cleared.
    fn reset(&self, expected: Option<u64>) -> bool {
        let mut state = self.credentials.lock();
        if expected.is_some_and(|generation| generation != state.generation) {
            return false;
        }
        if let Err(e) = self.vault.remove(keys::AUTH_REFRESH_TOKEN) {
            error!(error = %e, "failed to remove refresh token from vault");
        }
        if let Err(e) = self.vault.set_was_authenticated(false) {
            error!(error = %e, "failed to reset authenticated flag");
        }
        state.current = AuthCredentials::default();
        state.generation += 1;
        true
    }

    fn set_credentials(&self, credentials: AuthCredentials) {
        let mut state = self.credentials.lock();
        let persisted = match credentials.refresh_token.as_deref() {
            Some(token) => self.vault.store(keys::AUTH_REFRESH_TOKEN, token),
            None => self.vault.remove(keys::AUTH_REFRESH_TOKEN),
        };
        if let Err(e) = persisted {
            error!(error = %e, "failed to persist refresh token");
        }
        state.current = credentials;
        state.generation += 1;
    }

    fn refresh_gate(&self) -> Option<AuthOutcome> {
        if !self.has_refresh_token() {
            return Some(refresh_failure(MessagingError::NoRefreshToken.to_string()));
        }
        if !self.auto_refresh_token_when_expired {
            return Some(refresh_failure(
                MessagingError::AutoRefreshTokenDisabled.to_string(),
            ));
        }
        None
    }

    async fn cancellable<T>(
        &self,
        token: &CancellationToken,
        request: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        tokio::select! {
            result = request => result,
            _ = token.cancelled() => Err(ApiError::Cancelled),
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn emit_error(&self, code: ErrorCode, message: &str, action: CorrectiveAction) {
        self.emit(Event::Error(ErrorInfo::new(
            code,
            Some(message.to_string()),
            action,
        )));
    }
}

fn refresh_failure(message: String) -> AuthOutcome {
    AuthOutcome::Failure {
        code: ErrorCode::RefreshAuthTokenFailure,
        message,
    }
}

use std::{collections::HashMap, io, net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{Query, State},
        http::{StatusCode, header},
        response::{IntoResponse, Response},
        routing::get,
    },
    tokio::{
        net::TcpListener,
        sync::{Mutex, oneshot},
        task::JoinHandle,
    },
    secrecy::{ExposeSecret, SecretString},
    tracing::{debug, error, warn},
    url::Url,
};

use crate::{
    error::{BindError, CallbackError},
    types::AuthorizationCode,
};

/// Plain-text body returned once the authorization code has been accepted.
pub const CODE_RECEIVED_MESSAGE: &str =
    "Authorization code received. You can close this window now.";

/// Upper bound for in-flight requests to drain when the listener closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type CallbackOutcome = Result<AuthorizationCode, CallbackError>;

struct CallbackState {
    expected_state: SecretString,
    /// Taken by the first request that passes the state check.
    waiter: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

/// Single-use local HTTP listener receiving the provider's redirect.
///
/// Exactly one request with a matching `state` is accepted and answered with
/// HTTP 200; its outcome (code or missing code) is handed to
/// [`CallbackServer::get_authorization_code`]. Every other request is
/// answered with HTTP 500.
pub struct CallbackServer {
    local_addr: SocketAddr,
    timeout: Duration,
    outcome: Option<oneshot::Receiver<CallbackOutcome>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Starts listening on the host, port and path of `callback_url`.
    ///
    /// Returns [`BindError::Conflict`] when the port is already taken.
    pub async fn bind(
        callback_url: &Url,
        expected_state: SecretString,
        timeout: Duration,
    ) -> Result<Self, BindError> {
        let invalid = || BindError::InvalidCallbackUrl(callback_url.to_string());
        let port = callback_url.port_or_known_default().ok_or_else(invalid)?;
        let addrs = callback_url.socket_addrs(|| None).map_err(|_| invalid())?;

        let listener = match TcpListener::bind(addrs.as_slice()).await {
            Ok(listener) => listener,
            Err(source) if source.kind() == io::ErrorKind::AddrInUse => {
                return Err(BindError::Conflict { port, source });
            },
            Err(source) => {
                return Err(BindError::Other {
                    addr: callback_url.to_string(),
                    source,
                });
            },
        };
        let local_addr = listener.local_addr().map_err(|source| BindError::Other {
            addr: callback_url.to_string(),
            source,
        })?;

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            expected_state,
            waiter: Mutex::new(Some(outcome_tx)),
        });
        let path = match callback_url.path() {
            "" => "/",
            path => path,
        };
        let app = Router::new()
            .route(path, get(handle_callback))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!(error = %e, "callback listener stopped with an error");
            }
        });

        debug!(%local_addr, path, "callback listener started");
        Ok(Self {
            local_addr,
            timeout,
            outcome: Some(outcome_rx),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the redirect until the timeout elapses.
    ///
    /// Fails with [`CallbackError::Interrupted`] when the listener stops
    /// before anything was delivered. The outcome can be taken once; later
    /// calls fail with [`CallbackError::Unexpected`].
    pub async fn get_authorization_code(&mut self) -> CallbackOutcome {
        let Some(outcome) = self.outcome.take() else {
            error!("authorization code was already taken from this listener");
            return Err(CallbackError::Unexpected);
        };

        tokio::select! {
            received = outcome => received.unwrap_or_else(|_| {
                warn!("callback listener stopped before delivering a result");
                Err(CallbackError::Interrupted)
            }),
            () = tokio::time::sleep(self.timeout) => {
                warn!(timeout = ?self.timeout, "timed out waiting for the authorization callback");
                Err(CallbackError::TimeOut)
            },
        }
    }

    /// Stops accepting requests and releases the port.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                task.abort();
                let _ = task.await;
            }
        }
        debug!(local_addr = %self.local_addr, "callback listener closed");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(error) = params.get("error") {
        warn!(
            error,
            description = ?params.get("error_description"),
            "provider redirected with an error response"
        );
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let expected = state.expected_state.expose_secret();
    if params.get("state") != Some(expected) {
        warn!("rejecting callback request with a missing or foreign state");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let outcome = match params.get("code").filter(|code| !code.is_empty()) {
        Some(code) => Ok(AuthorizationCode::new(code.as_str())),
        None => {
            warn!("callback request did not contain an authorization code");
            Err(CallbackError::MissingAuthenticationCode)
        },
    };

    let Some(waiter) = state.waiter.lock().await.take() else {
        warn!("callback already handled, rejecting request");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    if waiter.send(outcome).is_err() {
        warn!("nobody is waiting for the callback anymore");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    debug!("authorization response received");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        CODE_RECEIVED_MESSAGE,
    )
        .into_response()
}

//! System backend: health, initialization and seal status.

use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Token, TokenStore};
use crate::backends::state::ServerState;
use crate::config::schema::ServerConfig;
use crate::handler::descriptor::{CompiledHandler, ConfigurationError, HandlerBuilder, MethodSpec};
use crate::handler::{Document, HandlerResult, ParameterBinding, Reply};
use crate::handler::result::error_object;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InitRequest {
    pub secret_shares: u32,
    pub secret_threshold: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResponse {
    pub keys: Vec<String>,
    pub root_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitStatus {
    pub initialized: bool,
}

pub struct SystemBackend {
    state: Arc<ServerState>,
    tokens: Arc<TokenStore>,
    settings: ServerConfig,
}

impl SystemBackend {
    pub fn new(state: Arc<ServerState>, tokens: Arc<TokenStore>, settings: ServerConfig) -> Self {
        Self {
            state,
            tokens,
            settings,
        }
    }

    /// Compile the backend's routes: `settings`, `health`, `init`, `seal-status`.
    pub fn into_handler(self) -> Result<CompiledHandler, ConfigurationError> {
        HandlerBuilder::new(self)
            .method(
                MethodSpec::new("settings")
                    .get(None)
                    .to(|sys: Arc<SystemBackend>, (): ()| async move { Reply::Value(sys.settings.clone()) }),
            )
            .method(
                MethodSpec::new("health")
                    .get(None)
                    .head(None)
                    .bind(ParameterBinding::query("standbyok").with_default(false))
                    .bind(ParameterBinding::query("activecode").with_default(200))
                    .bind(ParameterBinding::query("standbycode").with_default(429))
                    .bind(ParameterBinding::query("sealedcode").with_default(503))
                    .bind(ParameterBinding::query("uninitcode").with_default(501))
                    .to(
                        |sys: Arc<SystemBackend>,
                         (standbyok, activecode, standbycode, sealedcode, uninitcode): (bool, u16, u16, u16, u16)| async move {
                            sys.health(standbyok, activecode, standbycode, sealedcode, uninitcode)
                        },
                    ),
            )
            .method(
                MethodSpec::new("init_status")
                    .get("init")
                    .to(|sys: Arc<SystemBackend>, (): ()| async move {
                        Reply::Value(InitStatus {
                            initialized: sys.state.is_initialized(),
                        })
                    }),
            )
            .method(
                MethodSpec::new("start_init")
                    .put("init")
                    .bind(ParameterBinding::body("request"))
                    .to(|sys: Arc<SystemBackend>, (request,): (Document<InitRequest>,)| async move {
                        sys.start_init(request.into_inner())
                    }),
            )
            .method(
                MethodSpec::new("seal_status")
                    .get("seal-status")
                    .to(|sys: Arc<SystemBackend>, (): ()| async move { Reply::Value(sys.state.seal_status()) }),
            )
            .compile()
    }

    fn health(&self, standbyok: bool, activecode: u16, standbycode: u16, sealedcode: u16, uninitcode: u16) -> HandlerResult {
        let status = self.state.health();

        let code = if !status.initialized {
            uninitcode
        } else if status.sealed {
            sealedcode
        } else if status.standby && !standbyok {
            standbycode
        } else {
            activecode
        };

        let Ok(code) = StatusCode::from_u16(code) else {
            return error_object(StatusCode::BAD_REQUEST, [format!("invalid status code {}", code)]);
        };

        HandlerResult::object(&json!({
            "status": status,
            "parameters": {
                "standbyok": standbyok,
                "activecode": activecode,
                "standbycode": standbycode,
                "sealedcode": sealedcode,
                "uninitcode": uninitcode,
            },
        }))
        .with_status(code)
    }

    fn start_init(&self, request: InitRequest) -> HandlerResult {
        if request.secret_shares == 0
            || request.secret_threshold == 0
            || request.secret_threshold > request.secret_shares
        {
            return error_object(
                StatusCode::BAD_REQUEST,
                ["secret_threshold must be between 1 and secret_shares"],
            );
        }

        if !self.state.initialize(request.secret_shares, request.secret_threshold) {
            return error_object(StatusCode::BAD_REQUEST, ["Vault is already initialized"]);
        }

        let keys = (0..request.secret_shares)
            .map(|_| Uuid::new_v4().simple().to_string())
            .collect();
        let root_token = format!("s.{}", Uuid::new_v4().simple());
        self.tokens
            .insert(Token::new(&root_token).with_policies(vec!["root".to_string()]));

        tracing::info!(
            shares = request.secret_shares,
            threshold = request.secret_threshold,
            "Server initialized"
        );
        HandlerResult::object(&InitResponse { keys, root_token })
    }
}

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{self, AuthError, LoginOutcome},
    error::{AppError, AppResult},
    state::AppState,
};

pub const MSG_UNKNOWN_USER: &str = "El usuario no existe";
pub const MSG_MISMATCH: &str = "El usuario y/o contraseña son incorrectos";
pub const MSG_MUST_CHANGE: &str = "Debe cambiar su contraseña";
pub const MSG_LOGGED_IN: &str = "El usuario ha sido logueado";

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username")]
    pub usuario: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perfil: Option<String>,
    #[serde(rename = "mustChangePassword", skip_serializing_if = "Option::is_none")]
    pub must_change_password: Option<bool>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usuario: Option<String>,
}

impl LoginResponse {
    fn message(message: &'static str) -> Self {
        Self {
            message,
            perfil: None,
            must_change_password: None,
            user_id: None,
            usuario: None,
        }
    }
}

/// A wrong password is answered with 200 and a message; only an unknown user
/// is an error status.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(StatusCode, Json<LoginResponse>)> {
    let username = payload.usuario.trim().to_string();
    let outcome = state
        .with_conn(move |conn| match auth::authenticate(conn, &username, &payload.password) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(AuthError::UnknownUser(_)) => Ok(None),
            Err(AuthError::Database(err)) => Err(AppError::from(err)),
        })
        .await?;

    let response = match outcome {
        None => {
            return Ok((
                StatusCode::NOT_FOUND,
                Json(LoginResponse::message(MSG_UNKNOWN_USER)),
            ))
        }
        Some(LoginOutcome::Mismatch) => LoginResponse::message(MSG_MISMATCH),
        Some(LoginOutcome::MustChangePassword {
            user_id,
            username,
            profile,
        }) => {
            info!(%username, "login requires password change");
            LoginResponse {
                message: MSG_MUST_CHANGE,
                perfil: Some(profile),
                must_change_password: Some(true),
                user_id: Some(user_id),
                usuario: Some(username),
            }
        }
        Some(LoginOutcome::Authenticated { profile }) => LoginResponse {
            perfil: Some(profile),
            ..LoginResponse::message(MSG_LOGGED_IN)
        },
    };

    Ok((StatusCode::OK, Json(response)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_omit_optional_fields() {
        let body = serde_json::to_value(LoginResponse::message(MSG_MISMATCH)).unwrap();
        assert_eq!(body, serde_json::json!({ "message": MSG_MISMATCH }));
    }

    #[test]
    fn password_change_payload_uses_client_keys() {
        let id = Uuid::nil();
        let body = serde_json::to_value(LoginResponse {
            message: MSG_MUST_CHANGE,
            perfil: Some("admin".into()),
            must_change_password: Some(true),
            user_id: Some(id),
            usuario: Some("lupita".into()),
        })
        .unwrap();
        assert_eq!(body["mustChangePassword"], true);
        assert_eq!(body["userId"], id.to_string());
        assert_eq!(body["usuario"], "lupita");
        assert_eq!(body["perfil"], "admin");
    }
}

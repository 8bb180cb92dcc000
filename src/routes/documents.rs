use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{
    artifacts::{attachment_content_disposition, download_filename, PDF_CONTENT_TYPE},
    error::{AppError, AppResult},
    mail, orders,
    render::Attachment,
    state::AppState,
    submission::{schema::PHOTO_FIELDS, OrderSubmission, SubmissionStage, SubmissionWorkflow},
};

/// Full submission: store the order, render it and keep the PDF.
///
/// Text fields carry the order (nested `cliente`/`auto` as JSON strings);
/// file fields named `fotos` or `imagenes` are photos for the document.
pub async fn generate_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut attachments: Vec<Attachment> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let Some(name) = field.name().map(|n| n.trim_end_matches("[]").to_string()) else {
            continue;
        };

        if PHOTO_FIELDS.contains(&name.as_str()) {
            let filename = field
                .file_name()
                .map(|n| n.to_string())
                .unwrap_or_else(|| format!("foto-{}", attachments.len() + 1));
            let bytes = field.bytes().await.map_err(|err| {
                error!(error = %err, "failed to read photo bytes");
                AppError::bad_request(format!("failed to read photo: {err}"))
            })?;
            if !bytes.is_empty() {
                attachments.push(Attachment { filename, bytes });
            }
            continue;
        }

        let value = field.text().await.map_err(|err| {
            error!(error = %err, field = %name, "invalid form field");
            AppError::bad_request(format!("invalid value for '{name}': {err}"))
        })?;
        fields.push((name, value));
    }

    let submission = OrderSubmission::from_form_fields(fields)
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let outcome = SubmissionWorkflow::from_state(&state)
        .submit(submission, attachments)
        .await
        .map_err(|err| {
            error!(stage = %err.stage(), folio = err.folio().unwrap_or("-"), error = %err, "order submission failed");
            AppError::from(err)
        })?;

    info!(
        stage = %SubmissionStage::Responded,
        folio = %outcome.order.folio,
        pages = outcome.page_count,
        "order submission completed"
    );
    Ok(Json(json!({ "ok": true, "folio": outcome.order.folio })))
}

pub async fn download_pdf(
    State(state): State<AppState>,
    Path(folio): Path<String>,
) -> AppResult<impl IntoResponse> {
    let lookup = folio.clone();
    state
        .with_conn(move |conn| orders::find_by_folio(conn, &lookup).map_err(AppError::from))
        .await?;

    let (document, bytes) = state.artifacts().load_latest(&folio).await?;
    info!(%folio, key = %document.s3_key, "serving order document");

    Ok((
        [
            (header::CONTENT_TYPE, PDF_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                attachment_content_disposition(&download_filename(&folio)),
            ),
        ],
        bytes,
    ))
}

#[derive(Deserialize)]
pub struct SendPdfRequest {
    #[serde(default)]
    pub folio: Option<String>,
    #[serde(default, alias = "email")]
    pub correo: Option<String>,
}

pub async fn send_pdf_by_email(
    State(state): State<AppState>,
    Json(payload): Json<SendPdfRequest>,
) -> AppResult<Json<Value>> {
    let folio = payload.folio.as_deref().map(str::trim).unwrap_or_default();
    let recipient = payload.correo.as_deref().map(str::trim).unwrap_or_default();
    if folio.is_empty() || recipient.is_empty() {
        return Err(AppError::bad_request("folio y correo son requeridos"));
    }

    mail::send_order_pdf(
        &state.artifacts(),
        state.mailer.as_ref(),
        &state.config.business_name,
        folio,
        recipient,
    )
    .await?;

    Ok(Json(json!({ "ok": true })))
}

pub async fn regenerate_pdf(
    State(state): State<AppState>,
    Path(folio): Path<String>,
) -> AppResult<Json<Value>> {
    let outcome = SubmissionWorkflow::from_state(&state)
        .regenerate(&folio)
        .await?;
    Ok(Json(json!({ "ok": true, "folio": outcome.order.folio })))
}

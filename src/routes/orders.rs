use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Customer, Order, Vehicle},
    orders,
    state::AppState,
    submission::OrderSubmission,
};

/// Order as the web client reads it.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub folio: String,
    pub fecha: Option<NaiveDate>,
    pub taller: Option<String>,
    pub tecnico: Option<String>,
    pub cliente: Customer,
    pub auto: Vehicle,
    pub servicio: Option<String>,
    pub material: Option<String>,
    pub pago: Option<String>,
    #[serde(rename = "costoMaterial")]
    pub costo_material: f64,
    #[serde(rename = "manoDeObra")]
    pub mano_de_obra: f64,
    pub total: f64,
    pub descuento: bool,
    pub firma: Option<String>,
    #[serde(rename = "firmaTecnico")]
    pub firma_tecnico: Option<String>,
    #[serde(rename = "horaAsignacion")]
    pub hora_asignacion: Option<NaiveDateTime>,
    #[serde(rename = "horaContacto")]
    pub hora_contacto: Option<NaiveDateTime>,
    #[serde(rename = "horaTermino")]
    pub hora_termino: Option<NaiveDateTime>,
    #[serde(rename = "fechaTermino")]
    pub fecha_termino: Option<NaiveDate>,
    pub trabajo: Option<String>,
    pub observaciones: Option<String>,
    #[serde(rename = "calidadServicio")]
    pub calidad_servicio: Option<String>,
    pub pagado: bool,
    #[serde(rename = "fechaPago")]
    pub fecha_pago: Option<NaiveDateTime>,
    #[serde(rename = "createdAt")]
    pub created_at: NaiveDateTime,
    #[serde(rename = "updatedAt")]
    pub updated_at: NaiveDateTime,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let cliente = order.customer();
        let auto = order.vehicle();
        Self {
            id: order.id,
            folio: order.folio,
            fecha: order.service_date,
            taller: order.workshop,
            tecnico: order.technician,
            cliente,
            auto,
            servicio: order.service_description,
            material: order.material,
            pago: order.payment_method,
            costo_material: order.material_cost,
            mano_de_obra: order.labor_cost,
            total: order.total,
            descuento: order.discount,
            firma: order.customer_signature,
            firma_tecnico: order.technician_signature,
            hora_asignacion: order.assigned_at,
            hora_contacto: order.contacted_at,
            hora_termino: order.completed_at,
            fecha_termino: order
                .completion_date
                .or_else(|| order.completed_at.map(|ts| ts.date())),
            trabajo: order.work_type,
            observaciones: order.observations,
            calidad_servicio: order.quality_rating,
            pagado: order.paid,
            fecha_pago: order.paid_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Stores an order without rendering a document.
pub async fn add_order(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> AppResult<(StatusCode, Json<OrderResponse>)> {
    let draft = OrderSubmission::from_json(payload)
        .and_then(OrderSubmission::into_draft)
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let order = state
        .with_conn(move |conn| orders::persist_order(conn, &draft).map_err(AppError::from))
        .await?;
    info!(folio = %order.folio, "order added");

    Ok((StatusCode::CREATED, Json(order.into())))
}

pub async fn list_orders(State(state): State<AppState>) -> AppResult<Json<Vec<OrderResponse>>> {
    let rows = state
        .with_conn(|conn| orders::list_all(conn).map_err(AppError::from))
        .await?;
    Ok(Json(rows.into_iter().map(OrderResponse::from).collect()))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(folio): Path<String>,
) -> AppResult<Json<OrderResponse>> {
    let order = state
        .with_conn(move |conn| orders::find_by_folio(conn, &folio).map_err(AppError::from))
        .await?;
    Ok(Json(order.into()))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Path(folio): Path<String>,
) -> AppResult<Json<Value>> {
    let order = state
        .with_conn(move |conn| orders::mark_paid(conn, &folio).map_err(AppError::from))
        .await?;
    info!(folio = %order.folio, "order marked as paid");
    Ok(Json(json!({ "ok": true, "folio": order.folio })))
}

//! Wire shape of an order as the web client sends it, and its conversion into
//! an [`OrderDraft`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::folio;
use crate::models::{Customer, Vehicle};
use crate::orders::OrderDraft;
use crate::utils::json::{embedded_object, lenient_bool, optional_f64, optional_string};

pub const MAX_FOLIO_LENGTH: usize = 32;

/// Multipart file fields that carry photos.
pub const PHOTO_FIELDS: [&str; 2] = ["fotos", "imagenes"];

#[derive(Debug, Error, PartialEq)]
pub enum SubmissionValidationError {
    #[error("malformed order: {0}")]
    Malformed(String),
    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl SubmissionValidationError {
    fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderSubmission {
    #[serde(default, deserialize_with = "optional_string")]
    pub folio: Option<String>,
    #[serde(rename = "fecha", default, deserialize_with = "optional_string")]
    pub service_date: Option<String>,
    #[serde(rename = "taller", default, deserialize_with = "optional_string")]
    pub workshop: Option<String>,
    #[serde(rename = "tecnico", default, deserialize_with = "optional_string")]
    pub technician: Option<String>,
    #[serde(rename = "cliente", default, deserialize_with = "embedded_object")]
    pub customer: Customer,
    #[serde(rename = "auto", default, deserialize_with = "embedded_object")]
    pub vehicle: Vehicle,
    #[serde(rename = "servicio", default, deserialize_with = "optional_string")]
    pub service_description: Option<String>,
    #[serde(default, deserialize_with = "optional_string")]
    pub material: Option<String>,
    #[serde(rename = "pago", default, deserialize_with = "optional_string")]
    pub payment_method: Option<String>,
    #[serde(rename = "costoMaterial", default, deserialize_with = "optional_f64")]
    pub material_cost: Option<f64>,
    #[serde(rename = "manoDeObra", default, deserialize_with = "optional_f64")]
    pub labor_cost: Option<f64>,
    #[serde(default, deserialize_with = "optional_f64")]
    pub total: Option<f64>,
    #[serde(rename = "descuento", default, deserialize_with = "lenient_bool")]
    pub discount: bool,
    #[serde(rename = "firma", default, deserialize_with = "optional_string")]
    pub customer_signature: Option<String>,
    #[serde(rename = "firmaTecnico", default, deserialize_with = "optional_string")]
    pub technician_signature: Option<String>,
    #[serde(rename = "horaAsignacion", default, deserialize_with = "optional_string")]
    pub assigned_at: Option<String>,
    #[serde(rename = "horaContacto", default, deserialize_with = "optional_string")]
    pub contacted_at: Option<String>,
    #[serde(rename = "horaTermino", default, deserialize_with = "optional_string")]
    pub completed_at: Option<String>,
    #[serde(rename = "fechaTermino", default, deserialize_with = "optional_string")]
    pub completion_date: Option<String>,
    #[serde(rename = "trabajo", default, deserialize_with = "optional_string")]
    pub work_type: Option<String>,
    #[serde(rename = "observaciones", default, deserialize_with = "optional_string")]
    pub observations: Option<String>,
    #[serde(rename = "calidadServicio", default, deserialize_with = "optional_string")]
    pub quality_rating: Option<String>,
}

impl OrderSubmission {
    pub fn from_json(value: Value) -> Result<Self, SubmissionValidationError> {
        serde_json::from_value(value)
            .map_err(|err| SubmissionValidationError::Malformed(err.to_string()))
    }

    /// Builds a submission from the text fields of a multipart form. A field
    /// sent more than once keeps its last value.
    pub fn from_form_fields<I>(fields: I) -> Result<Self, SubmissionValidationError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let map: Map<String, Value> = fields
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();
        Self::from_json(Value::Object(map))
    }

    pub fn into_draft(self) -> Result<OrderDraft, SubmissionValidationError> {
        let folio = match self.folio {
            Some(folio) if folio.chars().count() > MAX_FOLIO_LENGTH => {
                return Err(SubmissionValidationError::field(
                    "folio",
                    format!("must be at most {MAX_FOLIO_LENGTH} characters"),
                ));
            }
            Some(folio) => {
                folio::check_client_folio(&folio)
                    .map_err(|reason| SubmissionValidationError::field("folio", reason))?;
                Some(folio)
            }
            None => None,
        };

        let material_cost = amount("costoMaterial", self.material_cost)?.unwrap_or(0.0);
        let labor_cost = amount("manoDeObra", self.labor_cost)?.unwrap_or(0.0);
        let total = amount("total", self.total)?.unwrap_or(material_cost + labor_cost);

        let service_date = self
            .service_date
            .as_deref()
            .map(|value| parse_date(value).map_err(|reason| SubmissionValidationError::field("fecha", reason)))
            .transpose()?;
        let completion_date = self
            .completion_date
            .as_deref()
            .map(|value| {
                parse_date(value).map_err(|reason| SubmissionValidationError::field("fechaTermino", reason))
            })
            .transpose()?;

        let assigned_at = timestamp("horaAsignacion", self.assigned_at.as_deref(), service_date)?;
        let contacted_at = timestamp("horaContacto", self.contacted_at.as_deref(), service_date)?;
        let completed_at = timestamp(
            "horaTermino",
            self.completed_at.as_deref(),
            completion_date.or(service_date),
        )?;

        Ok(OrderDraft {
            folio,
            service_date,
            workshop: self.workshop,
            technician: self.technician,
            customer: self.customer,
            vehicle: self.vehicle,
            work_type: self.work_type,
            service_description: self.service_description,
            material: self.material,
            payment_method: self.payment_method,
            material_cost,
            labor_cost,
            total,
            discount: self.discount,
            observations: self.observations,
            quality_rating: self.quality_rating,
            customer_signature: self.customer_signature,
            technician_signature: self.technician_signature,
            assigned_at,
            contacted_at,
            completed_at,
            completion_date,
        })
    }
}

fn amount(field: &'static str, value: Option<f64>) -> Result<Option<f64>, SubmissionValidationError> {
    match value {
        Some(v) if !v.is_finite() => Err(SubmissionValidationError::field(field, "must be a finite number")),
        Some(v) if v < 0.0 => Err(SubmissionValidationError::field(field, "must not be negative")),
        other => Ok(other),
    }
}

fn timestamp(
    field: &'static str,
    value: Option<&str>,
    base_date: Option<NaiveDate>,
) -> Result<Option<NaiveDateTime>, SubmissionValidationError> {
    value
        .map(|value| {
            normalize_timestamp(value, base_date)
                .map_err(|reason| SubmissionValidationError::field(field, reason))
        })
        .transpose()
}

/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY` and the date part of an RFC 3339
/// timestamp.
pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%d/%m/%Y") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.date_naive());
    }
    if let Some(timestamp) = parse_local_datetime(value) {
        return Ok(timestamp.date());
    }
    Err(format!("unrecognized date \"{value}\""))
}

/// Turns a free-form time into a timestamp.
///
/// RFC 3339 values are converted to UTC. Values without an offset are kept as
/// wall-clock time. A bare `HH:MM[:SS]` is placed on `base_date` and is an
/// error when there is none.
pub fn normalize_timestamp(
    value: &str,
    base_date: Option<NaiveDate>,
) -> Result<NaiveDateTime, String> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.naive_utc());
    }
    if let Some(timestamp) = parse_local_datetime(value) {
        return Ok(timestamp);
    }
    if let Some(time) = parse_time(value) {
        return base_date
            .map(|date| date.and_time(time))
            .ok_or_else(|| format!("time \"{value}\" needs a date"));
    }
    Err(format!("unrecognized time \"{value}\""))
}

fn parse_local_datetime(value: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    ["%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
}

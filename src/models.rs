use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;
use crate::utils::json::optional_string;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub credential: String,
    pub credential_kind: String,
    pub profile: String,
    pub must_change_password: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub credential: String,
    pub credential_kind: String,
    pub profile: String,
    pub must_change_password: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = orders)]
pub struct Order {
    pub id: Uuid,
    pub folio: String,
    pub service_date: Option<NaiveDate>,
    pub workshop: Option<String>,
    pub technician: Option<String>,
    pub customer: serde_json::Value,
    pub vehicle: serde_json::Value,
    pub work_type: Option<String>,
    pub service_description: Option<String>,
    pub material: Option<String>,
    pub payment_method: Option<String>,
    pub material_cost: f64,
    pub labor_cost: f64,
    pub total: f64,
    pub discount: bool,
    pub observations: Option<String>,
    pub quality_rating: Option<String>,
    pub customer_signature: Option<String>,
    pub technician_signature: Option<String>,
    pub assigned_at: Option<NaiveDateTime>,
    pub contacted_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub completion_date: Option<NaiveDate>,
    pub paid: bool,
    pub paid_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Order {
    /// Rows written by older clients may carry partial or foreign shapes, so
    /// anything that does not deserialize reads as an empty customer.
    pub fn customer(&self) -> Customer {
        serde_json::from_value(self.customer.clone()).unwrap_or_default()
    }

    pub fn vehicle(&self) -> Vehicle {
        serde_json::from_value(self.vehicle.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub folio: String,
    pub service_date: Option<NaiveDate>,
    pub workshop: Option<String>,
    pub technician: Option<String>,
    pub customer: serde_json::Value,
    pub vehicle: serde_json::Value,
    pub work_type: Option<String>,
    pub service_description: Option<String>,
    pub material: Option<String>,
    pub payment_method: Option<String>,
    pub material_cost: f64,
    pub labor_cost: f64,
    pub total: f64,
    pub discount: bool,
    pub observations: Option<String>,
    pub quality_rating: Option<String>,
    pub customer_signature: Option<String>,
    pub technician_signature: Option<String>,
    pub assigned_at: Option<NaiveDateTime>,
    pub contacted_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub completion_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = order_documents)]
pub struct OrderDocument {
    pub id: Uuid,
    pub folio: String,
    pub s3_key: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_documents)]
pub struct NewOrderDocument {
    pub id: Uuid,
    pub folio: String,
    pub s3_key: String,
    pub size_bytes: i64,
    pub checksum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "nombre", default, deserialize_with = "optional_string")]
    pub name: Option<String>,
    #[serde(rename = "telefono", default, deserialize_with = "optional_string")]
    pub phone: Option<String>,
    #[serde(rename = "calle", default, deserialize_with = "optional_string")]
    pub street: Option<String>,
    #[serde(rename = "noExterior", default, deserialize_with = "optional_string")]
    pub exterior_number: Option<String>,
    #[serde(rename = "noInterior", default, deserialize_with = "optional_string")]
    pub interior_number: Option<String>,
    #[serde(rename = "colonia", default, deserialize_with = "optional_string")]
    pub neighborhood: Option<String>,
    #[serde(rename = "correo", default, deserialize_with = "optional_string")]
    pub email: Option<String>,
    #[serde(rename = "tipoIdentificacion", default, deserialize_with = "optional_string")]
    pub id_type: Option<String>,
}

impl Customer {
    /// Street, numbers and neighborhood joined the way they are printed.
    pub fn address_line(&self) -> String {
        let mut line = String::new();
        if let Some(street) = non_blank(&self.street) {
            line.push_str(street);
        }
        if let Some(number) = non_blank(&self.exterior_number) {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(number);
        }
        if let Some(number) = non_blank(&self.interior_number) {
            line.push_str(&format!(" Int. {number}"));
        }
        if let Some(neighborhood) = non_blank(&self.neighborhood) {
            if !line.is_empty() {
                line.push_str(", ");
            }
            line.push_str(&format!("Col. {neighborhood}"));
        }
        line.trim().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(rename = "placas", default, deserialize_with = "optional_string")]
    pub plates: Option<String>,
    #[serde(rename = "noSerie", default, deserialize_with = "optional_string")]
    pub serial_number: Option<String>,
    #[serde(rename = "marca", default, deserialize_with = "optional_string")]
    pub make: Option<String>,
    #[serde(rename = "tipoAuto", default, deserialize_with = "optional_string")]
    pub kind: Option<String>,
    #[serde(rename = "anio", default, deserialize_with = "optional_string")]
    pub year: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

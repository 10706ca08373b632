//! JSON shapes returned by the API. Models never leave the server directly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::database::models::{locations, services, transactions, users, wash_statuses};

#[derive(Serialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserResource {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub location_id: Option<i64>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

impl From<&users::Model> for UserResource {
    fn from(user: &users::Model) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role.clone(),
            location_id: user.location_id,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LocationResource {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub opens_at: String,
    pub closes_at: String,
    pub bays: i32,
    pub is_active: bool,
}

impl From<&locations::Model> for LocationResource {
    fn from(location: &locations::Model) -> Self {
        Self {
            id: location.id,
            name: location.name.clone(),
            address: location.address.clone(),
            phone: location.phone.clone(),
            opens_at: location.opens_at.clone(),
            closes_at: location.closes_at.clone(),
            bays: location.bays,
            is_active: location.is_active,
        }
    }
}

#[derive(Serialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResource {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    /// Price formatted with two decimals, e.g. `12.50`.
    pub price: String,
    pub duration_minutes: i32,
    pub is_active: bool,
}

impl From<&services::Model> for ServiceResource {
    fn from(service: &services::Model) -> Self {
        Self {
            id: service.id,
            name: service.name.clone(),
            description: service.description.clone(),
            price_cents: service.price_cents,
            price: format_cents(service.price_cents),
            duration_minutes: service.duration_minutes,
            is_active: service.is_active,
        }
    }
}

#[derive(Serialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BookingResource {
    pub id: i64,
    pub user_id: i64,
    pub status: String,
    pub payment_status: String,
    #[schema(value_type = String, format = DateTime)]
    pub scheduled_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub estimated_finish_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub started_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub completed_at: Option<DateTime<Utc>>,
    pub vehicle_plate: String,
    pub vehicle_type: Option<String>,
    pub notes: Option<String>,
    pub service: Option<ServiceResource>,
    pub location: Option<LocationResource>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WashStatusResource {
    pub id: i64,
    pub status: String,
    pub note: Option<String>,
    pub changed_by: i64,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

impl From<&wash_statuses::Model> for WashStatusResource {
    fn from(entry: &wash_statuses::Model) -> Self {
        Self {
            id: entry.id,
            status: entry.status.clone(),
            note: entry.note.clone(),
            changed_by: entry.changed_by,
            created_at: entry.created_at,
        }
    }
}

#[derive(Serialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResource {
    pub id: i64,
    pub booking_id: i64,
    pub amount_cents: i64,
    pub amount: String,
    pub method: String,
    pub status: String,
    pub reference: Option<String>,
    pub recorded_by: i64,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

impl From<&transactions::Model> for TransactionResource {
    fn from(tx: &transactions::Model) -> Self {
        Self {
            id: tx.id,
            booking_id: tx.booking_id,
            amount_cents: tx.amount_cents,
            amount: format_cents(tx.amount_cents),
            method: tx.method.clone(),
            status: tx.status.clone(),
            reference: tx.reference.clone(),
            recorded_by: tx.recorded_by,
            created_at: tx.created_at,
        }
    }
}

pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_cents() {
        assert_eq!(format_cents(1250), "12.50");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-999), "-9.99");
    }

    #[test]
    fn user_resource_omits_password_hash() {
        let user = users::Model {
            id: 1,
            name: "Ana".into(),
            email: "ana@wash.example".into(),
            phone: None,
            password_hash: "$2b$12$secret".into(),
            role: "customer".into(),
            location_id: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        let json = serde_json::to_value(UserResource::from(&user)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["email"], "ana@wash.example");
        assert!(!serde_json::to_string(&user).unwrap().contains("secret"));
    }
}

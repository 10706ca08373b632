use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{api::resources::BookingResource, database::types::BookingStatus};

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingDto {
    pub service_id: i64,
    pub location_id: i64,
    /// Start of the slot; omitted means a walk-in starting now.
    #[schema(value_type = Option<String>, format = DateTime)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub vehicle_plate: String,
    pub vehicle_type: Option<String>,
    pub notes: Option<String>,
    /// Staff only: book on behalf of this customer.
    pub user_id: Option<i64>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    pub location_id: Option<i64>,
    /// Local date `YYYY-MM-DD` of the scheduled slot.
    pub date: Option<String>,
}

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingStatusDto {
    pub status: BookingStatus,
    pub note: Option<String>,
}

#[derive(Deserialize, ToSchema, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingDto {
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreatedResponse {
    pub booking: BookingResource,
    /// 1-based place in the location queue at creation time.
    pub queue_position: usize,
}

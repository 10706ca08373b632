use actix_web::{HttpRequest, HttpResponse, get, post, web};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        bookings::functions::ensure_can_view,
        context::{resolve_admin_context, resolve_auth_context, resolve_staff_context},
        helpers::{PageQuery, Paginated, find_booking, find_service},
        resources::TransactionResource,
        validation,
    },
    app_state::AppState,
    database::{
        models::{bookings, transactions},
        types::{BookingStatus, PaymentMethod, PaymentStatus, TransactionStatus},
    },
    errors::AppError,
};

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentDto {
    pub booking_id: i64,
    pub method: PaymentMethod,
    /// Defaults to the service price.
    pub amount_cents: Option<i64>,
    /// Card slip or online payment reference.
    pub reference: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TransactionListQuery {
    pub booking_id: Option<i64>,
    pub status: Option<TransactionStatus>,
}

/// Checks a booking can take a payment of `amount_cents`.
pub fn check_payable(booking: &bookings::Model, amount_cents: i64) -> Result<(), AppError> {
    if booking.status == BookingStatus::Cancelled.as_str() {
        return Err(AppError::InvalidInput(
            "Cancelled bookings cannot be paid".to_string(),
        ));
    }
    if booking.payment_status != PaymentStatus::Unpaid.as_str() {
        return Err(AppError::Conflict(format!(
            "Booking {} is already {}",
            booking.id, booking.payment_status
        )));
    }
    if amount_cents <= 0 {
        return Err(AppError::InvalidInput("amountCents must be positive".to_string()));
    }
    Ok(())
}

/// Stores a paid transaction and marks the booking paid.
pub async fn settle_payment(
    db: &DatabaseConnection,
    booking: bookings::Model,
    method: PaymentMethod,
    amount_cents: i64,
    reference: Option<String>,
    recorded_by: i64,
) -> Result<(transactions::Model, bookings::Model), AppError> {
    check_payable(&booking, amount_cents)?;

    let now = Utc::now();
    let tx = transactions::ActiveModel {
        booking_id: Set(booking.id),
        amount_cents: Set(amount_cents),
        method: Set(method.to_string()),
        status: Set(TransactionStatus::Paid.to_string()),
        reference: Set(reference),
        recorded_by: Set(recorded_by),
        created_at: Set(now),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let mut active = booking.into_active_model();
    active.payment_status = Set(PaymentStatus::Paid.to_string());
    active.updated_at = Set(Some(now));
    let booking = active.update(db).await?;
    Ok((tx, booking))
}

/// Marks a paid transaction and its booking refunded.
pub async fn refund_payment(
    db: &DatabaseConnection,
    tx: transactions::Model,
) -> Result<(transactions::Model, bookings::Model), AppError> {
    if tx.status != TransactionStatus::Paid.as_str() {
        return Err(AppError::Conflict(format!(
            "Transaction {} is already {}",
            tx.id, tx.status
        )));
    }

    let now = Utc::now();
    let mut active = tx.into_active_model();
    active.status = Set(TransactionStatus::Refunded.to_string());
    active.updated_at = Set(Some(now));
    let tx = active.update(db).await?;

    let booking = find_booking(db, tx.booking_id).await?;
    let mut booking = booking.into_active_model();
    booking.payment_status = Set(PaymentStatus::Refunded.to_string());
    booking.updated_at = Set(Some(now));
    let booking = booking.update(db).await?;
    Ok((tx, booking))
}

#[utoipa::path(
    post,
    path = "/api/transactions",
    tag = "Transactions",
    request_body = RecordPaymentDto,
    responses(
        (status = 201, description = "Payment recorded and booking marked paid", body = TransactionResource),
        (status = 400, description = "Invalid amount or cancelled booking"),
        (status = 403, description = "Staff role required"),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Booking already paid")
    )
)]
#[post("")]
pub async fn record_payment(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<RecordPaymentDto>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_staff_context(&req, &app_state).await?;
    let dto = body.into_inner();
    let booking = find_booking(&app_state.db, dto.booking_id).await?;

    let amount_cents = match dto.amount_cents {
        Some(amount) => amount,
        None => find_service(&app_state.db, booking.service_id).await?.price_cents,
    };
    let reference = validation::optional_text("reference", dto.reference.as_deref(), 120)?;

    let (tx, booking) = settle_payment(
        &app_state.db,
        booking,
        dto.method,
        amount_cents,
        reference,
        ctx.user_id(),
    )
    .await?;

    log::info!(
        "Payment {} of {} cents ({}) recorded for booking {} by user {}",
        tx.id,
        tx.amount_cents,
        tx.method,
        booking.id,
        ctx.user_id()
    );
    Ok(HttpResponse::Created().json(TransactionResource::from(&tx)))
}

#[utoipa::path(
    get,
    path = "/api/transactions",
    tag = "Transactions",
    params(TransactionListQuery, PageQuery),
    responses(
        (status = 200, description = "Transactions, newest first. Customers must pass their own bookingId", body = Paginated<TransactionResource>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Staff role required for unfiltered listing")
    )
)]
#[get("")]
pub async fn get_transactions(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    filter: web::Query<TransactionListQuery>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    let filter = filter.into_inner();
    let (page_index, per_page) = page.into_inner().normalize();

    let mut query = transactions::Entity::find();
    match filter.booking_id {
        Some(booking_id) => {
            let booking = find_booking(&app_state.db, booking_id).await?;
            ensure_can_view(&ctx, &booking)?;
            query = query.filter(transactions::Column::BookingId.eq(booking.id));
        }
        None if !ctx.is_staff() => {
            return Err(AppError::Forbidden("Staff role required".to_string()));
        }
        None => {}
    }
    if let Some(status) = filter.status {
        query = query.filter(transactions::Column::Status.eq(status.as_str()));
    }
    let query = query
        .order_by_desc(transactions::Column::CreatedAt)
        .order_by_desc(transactions::Column::Id);

    let paginator = query.paginate(&app_state.db, per_page);
    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(page_index).await?;
    let data = rows.iter().map(TransactionResource::from).collect();

    Ok(HttpResponse::Ok().json(Paginated::new(data, page_index, per_page, total)))
}

#[utoipa::path(
    post,
    path = "/api/transactions/{id}/refund",
    tag = "Transactions",
    params(("id" = i64, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Transaction refunded", body = TransactionResource),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Transaction already refunded")
    )
)]
#[post("/{id}/refund")]
pub async fn refund_transaction(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_admin_context(&req, &app_state).await?;
    let tx_id = path.into_inner();
    let tx = transactions::Entity::find_by_id(tx_id)
        .one(&app_state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", tx_id)))?;

    let (tx, _booking) = refund_payment(&app_state.db, tx).await?;

    log::info!("Transaction {} refunded by admin {}", tx.id, ctx.user_id());
    Ok(HttpResponse::Ok().json(TransactionResource::from(&tx)))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/transactions")
            .service(record_payment)
            .service(get_transactions)
            .service(refund_transaction),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn booking(status: &str, payment_status: &str) -> bookings::Model {
        let now = Utc::now();
        bookings::Model {
            id: 5,
            user_id: 1,
            service_id: 1,
            location_id: 1,
            scheduled_at: now,
            status: status.to_string(),
            payment_status: payment_status.to_string(),
            vehicle_plate: "M-AB 1".to_string(),
            vehicle_type: None,
            notes: None,
            estimated_finish_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: None,
        }
    }

    #[test]
    fn accepts_payment_for_open_booking() {
        assert!(check_payable(&booking("pending", "unpaid"), 1200).is_ok());
        assert!(check_payable(&booking("completed", "unpaid"), 1200).is_ok());
    }

    #[test]
    fn rejects_double_payment_and_cancelled_bookings() {
        assert!(matches!(
            check_payable(&booking("completed", "paid"), 1200),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            check_payable(&booking("cancelled", "unpaid"), 1200),
            Err(AppError::InvalidInput(_))
        ));
        assert!(check_payable(&booking("pending", "unpaid"), 0).is_err());
    }

    fn paid_tx(status: &str) -> transactions::Model {
        transactions::Model {
            id: 11,
            booking_id: 5,
            amount_cents: 1200,
            method: "card".to_string(),
            status: status.to_string(),
            reference: None,
            recorded_by: 2,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[actix_web::test]
    async fn settling_marks_the_booking_paid() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![paid_tx("paid")]])
            .append_query_results([vec![booking("completed", "paid")]])
            .into_connection();

        let (tx, paid) = settle_payment(
            &db,
            booking("completed", "unpaid"),
            PaymentMethod::Card,
            1200,
            Some("slip 42".to_string()),
            2,
        )
        .await
        .unwrap();
        assert_eq!(tx.status, "paid");
        assert_eq!(paid.payment_status, "paid");

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        assert!(format!("{:?}", log[0]).contains("transactions"));
        let booking_update = format!("{:?}", log[1]);
        assert!(booking_update.contains("payment_status") && booking_update.contains("paid"));
    }

    #[actix_web::test]
    async fn settling_a_paid_booking_writes_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let result = settle_payment(
            &db,
            booking("completed", "paid"),
            PaymentMethod::Cash,
            1200,
            None,
            2,
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(db.into_transaction_log().is_empty());
    }

    #[actix_web::test]
    async fn refund_marks_transaction_and_booking() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![paid_tx("refunded")]])
            .append_query_results([vec![booking("completed", "paid")]])
            .append_query_results([vec![booking("completed", "refunded")]])
            .into_connection();

        let (tx, refunded) = refund_payment(&db, paid_tx("paid")).await.unwrap();
        assert_eq!(tx.status, "refunded");
        assert_eq!(refunded.payment_status, "refunded");

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 3);
        assert!(format!("{:?}", log[0]).contains("refunded"));
        assert!(format!("{:?}", log[2]).contains("payment_status"));
    }

    #[actix_web::test]
    async fn refunding_twice_is_a_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let result = refund_payment(&db, paid_tx("refunded")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(db.into_transaction_log().is_empty());
    }
}

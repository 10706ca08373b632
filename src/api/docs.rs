use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    api::{
        auth, bookings, dashboard, health, locations, resources, services, transactions,
        users,
    },
    database::types,
    services::queue,
};

struct BearerToken;

impl Modify for BearerToken {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("`{id}|{secret}` token from /api/auth/login"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Auth
        auth::register,
        auth::login,
        auth::logout,
        auth::me,
        auth::update_profile,
        // Users
        users::get_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        // Locations
        locations::get_locations,
        locations::get_location,
        locations::create_location,
        locations::update_location,
        locations::delete_location,
        locations::get_queue,
        locations::get_estimate,
        // Services
        services::get_services,
        services::get_service,
        services::create_service,
        services::update_service,
        services::toggle_service,
        services::delete_service,
        // Bookings
        bookings::create_booking,
        bookings::get_bookings,
        bookings::get_booking,
        bookings::get_booking_history,
        bookings::cancel_booking,
        bookings::update_booking_status,
        // Transactions
        transactions::record_payment,
        transactions::get_transactions,
        transactions::refund_transaction,
        // Dashboard & health
        dashboard::get_dashboard,
        health::health,
    ),
    components(
        schemas(
            // --- Resources ---
            resources::UserResource,
            resources::LocationResource,
            resources::ServiceResource,
            resources::BookingResource,
            resources::WashStatusResource,
            resources::TransactionResource,
            queue::QueuedBooking,

            // --- Enumerations ---
            types::UserRole,
            types::BookingStatus,
            types::PaymentStatus,
            types::PaymentMethod,
            types::TransactionStatus,

            // --- Request & response bodies ---
            auth::RegisterDto,
            auth::LoginDto,
            auth::UpdateProfileDto,
            auth::AuthResponse,
            users::CreateUserDto,
            users::UpdateUserDto,
            locations::LocationDto,
            locations::QueueResponse,
            locations::EstimateResponse,
            services::ServiceDto,
            bookings::CreateBookingDto,
            bookings::UpdateBookingStatusDto,
            bookings::CancelBookingDto,
            bookings::BookingCreatedResponse,
            transactions::RecordPaymentDto,
            dashboard::StatusCounts,
            dashboard::DashboardSummary,
            health::HealthResponse,
        )
    ),
    modifiers(&BearerToken),
    tags(
        (name = "Auth", description = "Registration, login and the current user"),
        (name = "Users", description = "User administration (admin)"),
        (name = "Locations", description = "Wash locations, their queue and finish estimates"),
        (name = "Services", description = "Wash service catalogue"),
        (name = "Bookings", description = "Wash bookings and their progress"),
        (name = "Transactions", description = "Payments and refunds"),
        (name = "Dashboard", description = "Daily summary for staff"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

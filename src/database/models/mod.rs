pub mod api_tokens;
pub mod bookings;
pub mod locations;
pub mod services;
pub mod transactions;
pub mod users;
pub mod wash_statuses;

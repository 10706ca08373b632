pub mod functions;
pub mod handlers;
pub mod structures;

pub use handlers::{
    __path_cancel_booking, __path_create_booking, __path_get_booking, __path_get_booking_history,
    __path_get_bookings, __path_update_booking_status, cancel_booking, create_booking,
    get_booking, get_booking_history, get_bookings, init_routes, update_booking_status,
};

pub use structures::{
    BookingCreatedResponse, BookingListQuery, CancelBookingDto, CreateBookingDto,
    UpdateBookingStatusDto,
};

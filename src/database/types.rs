use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Enumerated columns are stored as lowercase text; these enums are the typed
/// view over them. `as_str` is the stored form, `FromStr` rejects anything else.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} `{}`", stringify!($name), other)),
                }
            }
        }
    };
}

text_enum!(
    UserRole {
        Customer => "customer",
        Staff => "staff",
        Admin => "admin",
    }
);

text_enum!(
    /// Lifecycle of a booking at the wash bay.
    BookingStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

text_enum!(
    PaymentStatus {
        Unpaid => "unpaid",
        Paid => "paid",
        Refunded => "refunded",
    }
);

text_enum!(
    PaymentMethod {
        Cash => "cash",
        Card => "card",
        Online => "online",
    }
);

text_enum!(
    TransactionStatus {
        Paid => "paid",
        Refunded => "refunded",
    }
);

impl UserRole {
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Staff | UserRole::Admin)
    }
}

impl BookingStatus {
    /// Pending and in-progress bookings occupy the queue.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::InProgress)
                | (BookingStatus::InProgress, BookingStatus::Completed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::InProgress, BookingStatus::Cancelled)
        )
    }

    pub fn active_values() -> Vec<&'static str> {
        BookingStatus::ALL
            .iter()
            .filter(|status| status.is_active())
            .map(|status| status.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_values() {
        assert_eq!("in_progress".parse::<BookingStatus>(), Ok(BookingStatus::InProgress));
        assert_eq!(" Admin ".parse::<UserRole>(), Ok(UserRole::Admin));
        assert!("washing".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn serde_uses_stored_form() {
        let json = serde_json::to_string(&BookingStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let method: PaymentMethod = serde_json::from_str("\"card\"").unwrap();
        assert_eq!(method, PaymentMethod::Card);
    }

    #[test]
    fn only_forward_transitions_are_allowed() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn active_statuses_occupy_the_queue() {
        assert_eq!(BookingStatus::active_values(), vec!["pending", "in_progress"]);
        assert!(BookingStatus::Completed.is_terminal());
        assert!(UserRole::Staff.is_staff());
        assert!(!UserRole::Customer.is_staff());
    }
}

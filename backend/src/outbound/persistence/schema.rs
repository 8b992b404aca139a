//! Diesel table definitions for the penalty engine schema.
//!
//! These must match `backend/migrations` exactly. Only the columns the engine
//! reads or writes are declared.

diesel::table! {
    /// Habit owners and their payment profile.
    users (id) {
        id -> Uuid,
        /// IANA name or legacy abbreviation; null means UTC.
        timezone -> Nullable<Varchar>,
        default_payment_method_id -> Nullable<Varchar>,
        stripe_customer_id -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Recurring commitments.
    habits (id) {
        id -> Uuid,
        user_id -> Uuid,
        /// Required weekdays, 0 = Monday.
        weekdays -> Array<Int2>,
        /// Penalty per miss in minor currency units.
        penalty_amount_minor -> Int8,
        created_at -> Timestamptz,
        is_active -> Bool,
        auto_pay_enabled -> Bool,
    }
}

diesel::table! {
    /// Submissions against a habit; `log_date` is the owner's local day.
    habit_logs (id) {
        id -> Uuid,
        habit_id -> Uuid,
        log_date -> Date,
        verified -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// One row per missed occurrence, unique on `(habit_id, penalty_date)`.
    penalties (id) {
        id -> Uuid,
        habit_id -> Uuid,
        user_id -> Uuid,
        amount_minor -> Int8,
        penalty_date -> Date,
        is_paid -> Bool,
        payment_intent_id -> Nullable<Varchar>,
        payment_method_id -> Nullable<Varchar>,
        payment_status -> Varchar,
        retry_count -> Int4,
        last_retry_date -> Nullable<Timestamptz>,
        last_attempt_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(habits -> users (user_id));
diesel::joinable!(habit_logs -> habits (habit_id));
diesel::joinable!(penalties -> habits (habit_id));

diesel::allow_tables_to_appear_in_same_query!(users, habits, habit_logs, penalties);

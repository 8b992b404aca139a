//! Macro for declaring port error enums with snake_case constructors.
//!
//! Each variant becomes a `thiserror` variant with the given display message
//! and a constructor named after the variant, accepting `impl Into<T>` for
//! every field.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            #[doc = concat!("Construct the `", stringify!($variant), "` variant.")]
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            #[doc = concat!("Construct the `", stringify!($variant), "` variant.")]
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    define_port_error! {
        pub enum LedgerTestError {
            Offline => "ledger offline",
            Query { message: String } => "ledger query failed: {message}",
            Card { code: String, message: String } => "card error {code}: {message}",
            Attempts { count: u32 } => "attempts exhausted after {count}",
        }
    }

    #[test]
    fn unit_variants_get_nullary_constructors() {
        assert_eq!(LedgerTestError::offline().to_string(), "ledger offline");
    }

    #[test]
    fn string_fields_accept_str_slices() {
        let err = LedgerTestError::query("timeout");
        assert_eq!(err.to_string(), "ledger query failed: timeout");
    }

    #[test]
    fn constructors_keep_field_order_and_types() {
        let card = LedgerTestError::card("card_declined", "insufficient funds");
        assert_eq!(
            card.to_string(),
            "card error card_declined: insufficient funds"
        );
        assert_eq!(
            LedgerTestError::attempts(3_u32).to_string(),
            "attempts exhausted after 3"
        );
    }
}

//! Bounded integer values.
//!
//! Every register sub-field has an inclusive range `[0, MAX]`. Values are
//! checked when constructed; there is no silent clamping anywhere in the
//! stack.

use thiserror::Error;

/// A value was outside the declared range of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{type_name} value {value} out of range [0, {max}]")]
pub struct RangeError {
    /// Name of the bounded type.
    pub type_name: &'static str,
    /// Rejected value.
    pub value: u64,
    /// Inclusive upper bound.
    pub max: u64,
}

impl RangeError {
    /// Create a range error for `type_name`.
    #[must_use]
    pub const fn new(type_name: &'static str, value: u64, max: u64) -> Self {
        Self {
            type_name,
            value,
            max,
        }
    }
}

/// Declare a bounded value newtype.
///
/// ```
/// dls_chip::ranged_value!(
///     /// Four-bit bias.
///     Bias, u16, 15
/// );
/// assert!(Bias::new(15).is_ok());
/// assert!(Bias::new(16).is_err());
/// ```
#[macro_export]
macro_rules! ranged_value {
    ($(#[$meta:meta])* $name:ident, $repr:ty, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($repr);

        impl $name {
            /// Inclusive upper bound.
            pub const MAX: $repr = $max;
            /// Lower bound.
            pub const MIN: $repr = 0;
            /// Number of representable values.
            pub const SIZE: u64 = $max as u64 + 1;

            /// Construct, rejecting values above [`Self::MAX`].
            ///
            /// # Errors
            ///
            /// Returns [`RangeError`]($crate::RangeError) if `value > MAX`.
            pub fn new(value: u64) -> ::core::result::Result<Self, $crate::RangeError> {
                if value > Self::MAX as u64 {
                    return Err($crate::RangeError::new(stringify!($name), value, Self::MAX as u64));
                }
                #[allow(clippy::cast_possible_truncation)]
                Ok(Self(value as $repr))
            }

            /// Construct in a `const` context. Out-of-range input fails compilation.
            #[must_use]
            pub const fn new_const(value: $repr) -> Self {
                assert!(value <= Self::MAX, "ranged value out of range");
                Self(value)
            }

            /// Raw value.
            #[must_use]
            pub const fn value(self) -> $repr {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::core::convert::TryFrom<u64> for $name {
            type Error = $crate::RangeError;

            fn try_from(value: u64) -> ::core::result::Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> $repr {
                value.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    crate::ranged_value!(
        /// Test value.
        Small, u16, 6
    );

    #[test]
    fn accepts_bounds() {
        assert_eq!(Small::new(0).unwrap().value(), 0);
        assert_eq!(Small::new(6).unwrap().value(), 6);
    }

    #[test]
    fn rejects_above_max() {
        let err = Small::new(7).unwrap_err();
        assert_eq!(err.value, 7);
        assert_eq!(err.max, 6);
        assert_eq!(err.type_name, "Small");
    }

    #[test]
    fn const_construction() {
        const V: Small = Small::new_const(3);
        assert_eq!(u16::from(V), 3);
    }
}

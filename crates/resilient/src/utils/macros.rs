//! Declarative helpers for policy enums

/// Implements `Display` and `FromStr` for a fieldless enum
///
/// Each variant maps to one lowercase name. Parsing is case-insensitive and
/// fails with [`crate::ResilienceError::InvalidConfiguration`].
///
/// ```rust
/// use resilient::impl_name_conversions;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub enum Mode {
///     Deep,
///     Fast,
/// }
///
/// impl_name_conversions!(Mode {
///     Deep => "deep",
///     Fast => "fast",
/// });
///
/// assert_eq!("FAST".parse::<Mode>().ok(), Some(Mode::Fast));
/// ```
#[macro_export]
macro_rules! impl_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = $crate::error::ResilienceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err($crate::error::ResilienceError::invalid(format!(
                        "Invalid {}: {}",
                        stringify!($enum_name),
                        s
                    ))),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Deep,
        Fast,
    }

    impl_name_conversions!(Mode {
        Deep => "deep",
        Fast => "fast",
    });

    /// Validates display and case-insensitive parsing agree.
    #[test]
    fn test_name_conversions() {
        assert_eq!(Mode::Deep.to_string(), "deep");
        assert_eq!(Mode::from_str("FaSt").ok(), Some(Mode::Fast));
        assert_eq!(Mode::from_str(" deep ").ok(), Some(Mode::Deep));
    }

    /// Validates unknown names are rejected with the enum named.
    ///
    /// Assertions:
    /// - The error message names the enum and the bad input.
    #[test]
    fn test_invalid_name() {
        let error = Mode::from_str("shallow").unwrap_err();
        assert!(error.to_string().contains("Invalid Mode: shallow"));
        assert!(Mode::from_str("").is_err());
    }
}

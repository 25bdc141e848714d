//! String conversions for the small enums that travel through config files,
//! environment variables and persisted records.
//!
//! ```rust
//! use tunelink_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum GrantKind {
//!     AuthorizationCode,
//!     RefreshToken,
//! }
//!
//! impl_domain_status_conversions!(GrantKind {
//!     AuthorizationCode => "authorization_code",
//!     RefreshToken => "refresh_token",
//! });
//!
//! assert_eq!(GrantKind::RefreshToken.to_string(), "refresh_token");
//! assert_eq!("REFRESH_TOKEN".parse::<GrantKind>(), Ok(GrantKind::RefreshToken));
//! ```

/// Derive `Display` (the canonical lowercase name) and a case-insensitive
/// `FromStr` (`Err = String`) from one variant-to-name table.
///
/// Names must be lowercase; parsing lowercases the input before matching.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let name = match self {
                    $(Self::$variant => $str,)+
                };
                f.pad(name)
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(value: &str) -> ::std::result::Result<Self, Self::Err> {
                let normalized = value.trim().to_ascii_lowercase();
                $(
                    if normalized == $str {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!(
                    "unknown {} '{}' (expected one of: {})",
                    stringify!($enum_name),
                    value,
                    [$($str),+].join(", ")
                ))
            }
        }
    };
}

//! Extensions for mapping errors to `JubakoResult` concisely.
//!
//! These helpers reduce repetitive `.map_err(|e| Arc::new(JubakoError::…))`
//! patterns when converting external error types into the crate's
//! `JubakoResult<T>` alias (`Result<T, Arc<JubakoError>>`).
//!
//! - Use [`JubakoResultExt::into_jubako`] for error types that implement
//!   `Into<JubakoError>` (e.g. `figment::Error`).
//! - Use [`JubakoDecodeExt::into_jubako_decode`] for deserialisation
//!   failures that should become [`JubakoError::Decode`].
//!
//! # Examples
//!
//! ```
//! use jubako::{JubakoDecodeExt, JubakoResult};
//!
//! fn port() -> JubakoResult<u16> {
//!     serde_json::from_value(serde_json::json!(8080)).into_jubako_decode()
//! }
//! assert_eq!(port().ok(), Some(8080));
//! ```

use std::sync::Arc;

use crate::{JubakoError, JubakoResult};

/// Generic extension for mapping any `Result<T, E>` with
/// `E: Into<JubakoError>` into a `JubakoResult<T>`.
pub trait JubakoResultExt<T, E> {
    /// Convert `Result<T, E>` into `JubakoResult<T>` using `Into<JubakoError>`.
    ///
    /// # Errors
    ///
    /// Propagates the original error after conversion into `Arc<JubakoError>`.
    fn into_jubako(self) -> JubakoResult<T>;
}

impl<T, E> JubakoResultExt<T, E> for Result<T, E>
where
    E: Into<JubakoError>,
{
    fn into_jubako(self) -> JubakoResult<T> {
        self.map_err(|e| Arc::new(e.into()))
    }
}

/// Extension mapping deserialisation failures into [`JubakoError::Decode`].
pub trait JubakoDecodeExt<T> {
    /// Convert the error into a [`JubakoError::Decode`].
    ///
    /// # Errors
    ///
    /// Returns a `JubakoError::Decode` wrapped in `Arc` when the input is `Err`.
    fn into_jubako_decode(self) -> JubakoResult<T>;
}

impl<T> JubakoDecodeExt<T> for Result<T, serde_json::Error> {
    fn into_jubako_decode(self) -> JubakoResult<T> {
        self.map_err(JubakoError::decode)
    }
}

impl From<figment::Error> for JubakoError {
    fn from(e: figment::Error) -> Self {
        Self::Gathering(Box::new(e))
    }
}

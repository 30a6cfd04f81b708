/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/5/25
******************************************************************************/

/// Module containing custom error types used throughout the library.
///
/// This module provides the [`LightstreamerError`] returned by every fallible operation,
/// plus the illegal argument and illegal state errors it wraps.
pub mod error;
mod util;

mod logger;

pub use error::{IllegalArgumentException, IllegalStateException, LightstreamerError};
pub use logger::{setup_logger, setup_logger_with_level};
pub(crate) use util::parse_arguments;
pub use util::setup_signal_hook;

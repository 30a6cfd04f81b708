/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Connection configuration: who to connect to ([`ConnectionDetails`]) and how
//! ([`ConnectionOptions`]).

mod details;
mod options;

pub use self::details::ConnectionDetails;
pub use self::options::{ConnectionOptions, MaxBandwidth};

//! Data types shared across the link
//!
//! This module contains the error type and the status values published to consumers.

mod error;
mod status;

pub use error::{LinkError, LinkResult};
pub use status::{CloseDisposition, ConnectionState, LinkEvent, LinkStatus};

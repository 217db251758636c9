//! Domain types shared across the dispatcher

mod contact;
mod status;

pub use contact::Contact;
pub use status::{DeliveryStatus, StatusRecord};

//! External delivery channels for operator alerts.

pub mod email;

//! Hostwright event bus and operator alerting.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`] -- the domain event envelope.
//! - [`delivery`] -- external delivery channels (email).
//! - [`AlertRouter`] -- forwards alert-worthy events to the operator.

pub mod alerts;
pub mod bus;
pub mod delivery;

pub use alerts::AlertRouter;
pub use bus::{EventBus, PlatformEvent};
pub use delivery::email::{EmailConfig, EmailDelivery};

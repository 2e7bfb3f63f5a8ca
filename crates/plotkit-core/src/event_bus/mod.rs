//! Event bus for plot lifecycle notifications
//!
//! The supervisor publishes here; UI bridges and loggers subscribe. Events
//! carry only small payloads so they can be broadcast cheaply; anything
//! heavyweight (the plan itself) is fetched from the supervisor on demand.

mod bus;
mod events;

pub use bus::{EventBus, EventBusConfig, EventBusError, EventFilter, SubscriptionId};
pub use events::{DeviceInfo, EventCategory, PlotEvent};

//! # plotkit Core
//!
//! Core types and utilities for plotkit.
//! Provides the fundamental abstractions for device kinematics, tooling
//! profiles, geometry, unit boundaries, errors, and lifecycle events.

pub mod config;
pub mod device;
pub mod error;
pub mod event_bus;
pub mod geometry;
pub mod profile;
pub mod units;

pub use config::{Config, ConnectionSettings};
pub use device::{Device, Hardware};
pub use error::{
    Error, PlannerError, ProtocolError, Result, SupervisorError, TransportError,
};
pub use event_bus::{
    DeviceInfo, EventBus, EventBusConfig, EventCategory, EventFilter, PlotEvent, SubscriptionId,
};
pub use geometry::Vec2;
pub use profile::{AccelerationProfile, ToolingProfile};
pub use units::StepsPerMm;

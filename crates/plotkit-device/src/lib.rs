//! # plotkit Device
//!
//! EiBotBoard support for plotkit: serial transport and discovery, the EBB
//! command protocol with firmware capability gating and sub-step error
//! accumulation, and the plot supervisor that executes plans under
//! concurrent pause/resume/cancel control.

pub mod ebb;
pub mod protocol;
pub mod supervisor;
pub mod transport;

pub use ebb::{EbbDriver, FirmwareVersion, MicrostepMode, MotionStatus, StepAccumulator};
pub use protocol::{event_message, ClientMessage, PlotStatus, ServerMessage};
pub use supervisor::{PlotState, PlotSupervisor};
pub use transport::{
    find_ebb_port, list_ebb_ports, MockTransport, PortInfo, SerialTransport, Transport, EBB_BAUD,
    EBB_MANUFACTURER, EBB_PID, EBB_VID,
};

//! Device model
//!
//! - `outpin` - one named digital output with debounced transitions
//! - `output_control` - a heat/cool pin pair driven from a signed duty cycle
//! - `switch` - a user-exposed on/off pin with optional inversion
//! - `controller` - the temperature controller state machine and PID

pub mod controller;
pub mod outpin;
pub mod output_control;
pub mod switch;

//! gsrflow turns a galvanic skin response sensor into light. A board reads
//! skin conductance at a fixed rate, and this pipeline smooths the raw
//! signal, learns a per-wearer baseline during a timed calibration pass,
//! rejects motion-artifact spikes, keeps a slow-moving affect estimate, and
//! renders the result as a moving trail on an addressable LED chain.
//!
//! A host can steer the pipeline over a line-delimited serial protocol:
//! plain-text commands in, JSON status and telemetry lines out. See
//! [`protocol`] for the wire format and [`visualizer`] for the context
//! object that ties the stages together.
//!
//! Two binaries ship with the library: `gsrflow` drives real hardware over
//! a serial port, and `monitor` runs the whole pipeline against a simulated
//! sensor inside a terminal UI.

#![warn(missing_docs)]
pub mod affect;
pub mod animation;
pub mod args;
pub mod baseline;
pub mod color;
pub mod error;
pub mod filter;
pub mod led;
pub mod protocol;
pub mod sensor;
pub mod spike;
pub mod visualizer;

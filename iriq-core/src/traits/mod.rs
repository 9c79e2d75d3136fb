//! Seams Between the Engine and the Outside World
//!
//! The sync engine never touches a socket, a file or an ADC directly. Each
//! external collaborator sits behind one narrow trait so the same engine runs
//! against real hardware on the device and against fakes in tests.
//!
//! ## Module Organization
//!
//! - [`time`] - time source abstraction
//! - [`transport`] - one blocking HTTP exchange
//! - [`store`] - durable credential record
//! - [`auth`] - credential issuance
//! - [`sensor`] - raw moisture probe access
//!
//! Relay, LED and delay access use the `embedded-hal` 1.0 traits
//! (`OutputPin`, `StatefulOutputPin`, `DelayNs`) instead of crate-local ones,
//! so any HAL that implements them plugs straight into the
//! [`Actuator`](crate::actuator::Actuator).

pub mod auth;
pub mod sensor;
pub mod store;
pub mod time;
pub mod transport;

pub use auth::{Authenticator, IssuedToken};
pub use sensor::MoistureProbe;
pub use store::CredentialStore;
pub use time::TimeSource;
pub use transport::{Method, Request, Response, Transport};

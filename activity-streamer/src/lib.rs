//! Live feed path of the activity inspector.
//!
//! A synthetic source emits one event per tick. Events go through a bounded
//! buffer to a slow consumer. The producer never blocks on the buffer: when it
//! is full, the event is processed synchronously by the producer itself. With
//! the default timings (produce every 1s, process in 2s) the buffer fills up and
//! direct dispatch becomes the steady state.
//!
//! ```text
//!   source --tick--> producer --try_send--> [ buffer ] --recv--> consumer --> processor
//!                       |                                                       ^
//!                       +------------------ full: direct dispatch --------------+
//! ```
//!
//! Both loops are `tokio-graceful-shutdown` subsystems, a shutdown request stops
//! them at their next iteration. Delivery is best effort, an event in flight at
//! shutdown is lost.

pub mod coordinator;
pub mod snapshot;

//! Configuration for a Milter server instance.

use std::time::Duration;

use oxmilter_common::actions::Action;

/// Knobs for [`crate::Acceptor`] and [`crate::Session`].
///
/// Every field has a default matching this crate's documented behaviour;
/// binding the listener to a host/port and parsing that from the
/// environment or a config file is the embedding CLI's concern, not this
/// crate's.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind the listening socket to.
    pub bind_host: String,
    /// Port to bind the listening socket to. `0` asks the OS for an
    /// ephemeral port, useful for tests.
    pub bind_port: u16,
    /// Backlog passed to the listening socket.
    pub backlog: u32,
    /// Largest packet body this implementation will read or write.
    pub max_buffer_size: usize,
    /// How many decoded commands may be buffered ahead of the hook
    /// dispatch loop before the decoder loop applies backpressure.
    pub command_queue_capacity: usize,
    /// How long a single hook invocation may run before it is treated as
    /// having missed its deadline.
    pub hook_deadline: Duration,
    /// The verdict synthesized when the end-of-message hook misses its
    /// deadline (other stages reply with `Tempfail` directly; end-of-message
    /// additionally carries this as its terminal action).
    pub eom_deadline_verdict: Action,
    /// How long the acceptor waits for in-flight sessions to finish after
    /// a shutdown signal before forcibly closing them.
    pub drain_timeout: Duration,
    /// Whether the leading space byte of a header value is preserved, per
    /// `SMFIP_HDR_LEADSPC`. Left off by default to match common MTA
    /// expectations.
    pub header_leading_space: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            backlog: 1024,
            max_buffer_size: 2_usize.pow(16),
            command_queue_capacity: 8,
            hook_deadline: Duration::from_secs(8),
            eom_deadline_verdict: Action::from(oxmilter_common::actions::Tempfail),
            drain_timeout: Duration::from_secs(10),
            header_leading_space: false,
        }
    }
}

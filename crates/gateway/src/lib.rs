//! howl control plane: accepts worker nodes over TCP, routes chat updates to
//! the worker hosting each game and answers the built-in commands itself.

pub mod builtin;
pub mod commands;
pub mod router;
pub mod server;
pub mod state;
pub mod worker_server;

#[cfg(test)]
pub(crate) mod test_support;

pub use {
    router::{RouteOutcome, Router},
    server::{StartOptions, default_catalog, start},
    state::{ChatAdmins, GatewayState, Stats},
    worker_server::{TcpWorkerTransport, WorkerServer},
};

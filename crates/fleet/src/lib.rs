//! Worker fleet control: who is connected, where each chat's session lives,
//! and how workers join, drain and leave.
//!
//! - [`FleetRegistry`] holds every worker handle behind one lock.
//! - [`SessionLocator`] maps a chat to the worker hosting it.
//! - [`LifecycleController`] places sessions and removes workers, sending
//!   shutdown notices through a [`Dispatcher`].

pub mod dispatch;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod locator;
pub mod registry;
pub mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use {
    dispatch::{
        ButtonAction, Delivery, DispatchError, Dispatcher, InlineButton, InlineMenu, Keyboard,
        SendOptions, TextFormat,
    },
    error::{FleetError, Result},
    health::spawn_health_monitor,
    lifecycle::{
        Assignment, FleetPolicy, LifecycleController, NODE_SHUTS_DOWN, RemovalReason,
        RemovalReport,
    },
    locator::SessionLocator,
    registry::FleetRegistry,
    worker::{SessionRef, TransportError, WorkerHandle, WorkerSnapshot, WorkerState, WorkerTransport},
};

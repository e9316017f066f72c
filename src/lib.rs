//! Distributed synthetic monitoring.
//!
//! A **master** holds a declarative configuration of HTTP endpoints and
//! alert policy, schedules periodic probes, persists results as a time
//! series, evaluates stateful alert rules and dispatches notifications.
//! Zero or more **satellites** pull their assigned endpoints from the
//! master, execute the same probe logic remotely and push results back.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────── Master ─────────────────┐
//!   file         │  ConfigManager ─► Scheduler ─► Checker  │
//!   watch ◄──────┤        │            │           │       │
//!                │        │            ▼           ▼       │
//!                │        │      AlertEvaluator  MetricStore
//!                │        ▼            │                   │
//!                │  FleetCoordinator ◄─┘                   │
//!                └──────────▲──────────────────────────────┘
//!                           │ HTTP (heartbeat / config / results)
//!                       Satellite(s)
//! ```
//!
//! Configuration is the single source of truth; the scheduler subscribes
//! to snapshot changes and is the only spawner of probes on the master.

pub mod agent;
pub mod alerting;
pub mod api;
pub mod config;
pub mod fleet;
pub mod probe;
pub mod scheduler;
pub mod storage;

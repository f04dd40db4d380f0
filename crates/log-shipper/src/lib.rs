// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client side of the log collector.
//!
//! A [`LogShipper`] owns a bounded in-memory queue. Producers enqueue events
//! without blocking; one background task per shipper drains the queue in
//! batches, either on a timer or as soon as a full batch is waiting, and
//! posts them to the collector. Failed batches are requeued at the front of
//! the queue until the retry budget runs out.
//!
//! ```rust,ignore
//! use log_shipper::{LogShipper, ShipperConfig};
//!
//! let shipper = LogShipper::new(ShipperConfig {
//!     service_name: "checkout".to_string(),
//!     ..Default::default()
//! })?;
//! shipper.start()?;
//! shipper.info("order placed", Some("checkout.api"));
//! shipper.shutdown().await;
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod availability;
pub mod config;
pub mod error;
pub mod instrumentation;
pub mod queue;
pub mod retry;
pub mod shipper;
pub mod transport;

pub use config::{CorrelationIdFn, OverflowPolicy, ShipperConfig};
pub use error::{ShipperError, TransportError};
pub use instrumentation::{HttpExchange, ShipperLayer};
pub use log_collector_proto::{LogEvent, Severity};
pub use shipper::{FlushOutcome, LogShipper};
pub use transport::{HttpTransport, Transport};

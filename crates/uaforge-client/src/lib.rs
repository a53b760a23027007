// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Asynchronous OPC UA client over the unsecured binary transport.
//!
//! The crate builds the client half of the connection protocol on top of
//! [`uaforge_wire`]: a multiplexing TCP transport, a lazily renewed secure
//! channel (policy `None`), an anonymous session, the attribute and view
//! services, and a subscription engine with a single publish pump.
//!
//! # Entry points
//!
//! - [`UaClient`]: the async client. [`UaClient::connect`] runs the whole
//!   pipeline; `read`/`write`/`browse`/`subscribe` retry retryable failures
//!   on a fresh connection per [`RetryConfig`].
//! - [`VariableAccessor`]: a blocking facade for string-named variables in
//!   namespace 2, owning its own runtime.
//!
//! ```no_run
//! use uaforge_client::{ClientConfig, UaClient};
//! use uaforge_wire::NodeId;
//!
//! # async fn demo() -> uaforge_client::ClientResult<()> {
//! let config = ClientConfig::for_host("plc7", 4840)?;
//! let client = UaClient::connect(config).await?;
//! let value = client.read_one(&NodeId::string(2, "Machine.Speed")).await?;
//! println!("speed: {value}");
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod accessor;
pub mod channel;
pub mod client;
pub mod conversion;
pub mod error;
pub mod service;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod types;

pub use accessor::VariableAccessor;
pub use channel::SecureChannel;
pub use client::{AttributeService, ClientStats, UaClient};
pub use conversion::{Quality, TypedValue};
pub use error::{
    ChannelError, ClientError, ClientResult, ConfigError, ConnectionError, ConversionError,
    ErrorSeverity, ServiceError, SessionError, SubscriptionError,
};
pub use session::{Session, SessionState};
pub use subscription::{
    DataChangeEvent, SubscriptionEngine, SubscriptionHandle, SubscriptionStats,
};
pub use transport::Transport;
pub use types::{
    ClientConfig, ClientConfigBuilder, MonitoredItemSettings, MonitoringMode, RetryConfig,
    RetryStrategy, SecurityMode, SecurityPolicy, SubscriptionSettings,
};

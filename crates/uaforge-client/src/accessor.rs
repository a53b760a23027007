// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Blocking facade for string-named process variables.
//!
//! [`VariableAccessor`] wraps [`UaClient`] for callers that live outside an
//! async runtime: it owns a dedicated tokio runtime and every method is a
//! `block_on`. Variable names map to string node ids in namespace 2, the
//! convention of the PLC servers this facade talks to, and the same mapping
//! is used for reads and writes.

use std::str::FromStr;

use tokio::runtime::Runtime;
use tracing::warn;

use uaforge_wire::{NodeId, Variant};

use crate::client::UaClient;
use crate::conversion::truthy;
use crate::error::{ClientResult, ConnectionError, ConversionError};
use crate::types::ClientConfig;

/// Namespace index the facade addresses variables in.
const VARIABLE_NAMESPACE: u16 = 2;

/// Synchronous access to named server variables.
///
/// Exclusive (`&mut self`) methods keep one call in flight per accessor.
pub struct VariableAccessor {
    runtime: Option<Runtime>,
    client: Option<UaClient>,
}

impl VariableAccessor {
    /// Connects to `opc.tcp://{host}:{port}` with default settings.
    pub fn connect(host: &str, port: u16) -> ClientResult<Self> {
        Self::connect_with(ClientConfig::for_host(host, port)?)
    }

    /// Connects with an explicit configuration.
    pub fn connect_with(config: ClientConfig) -> ClientResult<Self> {
        let endpoint = config.endpoint_url.clone();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|source| ConnectionError::Io { endpoint, source })?;
        let client = runtime.block_on(UaClient::connect(config))?;
        Ok(Self {
            runtime: Some(runtime),
            client: Some(client),
        })
    }

    /// Reads the variable's value. A bad quality is an error.
    pub fn read(&mut self, name: &str) -> ClientResult<Variant> {
        let node_id = variable_node(name);
        let (runtime, client) = self.parts()?;
        let value = runtime.block_on(client.read_one(&node_id))?;
        Ok(value.value)
    }

    /// Reads the variable rendered as a string. A null value reads as `""`.
    pub fn read_string(&mut self, name: &str) -> ClientResult<String> {
        match self.read(name)? {
            Variant::Null => Ok(String::new()),
            value => Ok(value.to_string()),
        }
    }

    /// Reads the variable as a string and parses it as `T`. A value that
    /// does not parse is a conversion error.
    pub fn read_as<T: FromStr>(&mut self, name: &str) -> ClientResult<T> {
        let rendered = self.read_string(name)?;
        rendered
            .parse()
            .map_err(|_| {
                ConversionError::ParseFailed {
                    value: rendered,
                    target: std::any::type_name::<T>(),
                }
                .into()
            })
    }

    /// Reads the variable as a boolean: case-insensitive `"true"` or `"1"`
    /// is true, anything else false. Never errors on content.
    pub fn read_bool(&mut self, name: &str) -> ClientResult<bool> {
        Ok(truthy(&self.read_string(name)?))
    }

    /// Writes the variable's value. A bad write status is an error.
    pub fn write(&mut self, name: &str, value: impl Into<Variant>) -> ClientResult<()> {
        let node_id = variable_node(name);
        let (runtime, client) = self.parts()?;
        runtime.block_on(client.write_one(&node_id, value.into()))
    }

    /// Disconnects and releases the runtime. Failures are logged and
    /// swallowed; calling this on an already shut down accessor is a no-op.
    pub fn shutdown(&mut self) {
        let client = self.client.take();
        if let (Some(runtime), Some(client)) = (self.runtime.as_ref(), client) {
            runtime.block_on(client.disconnect());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }

    fn parts(&mut self) -> ClientResult<(&Runtime, &UaClient)> {
        match (self.runtime.as_ref(), self.client.as_ref()) {
            (Some(runtime), Some(client)) => Ok((runtime, client)),
            _ => Err(ConnectionError::NotConnected.into()),
        }
    }
}

impl Drop for VariableAccessor {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!("accessor dropped without shutdown, disconnecting");
            self.shutdown();
        }
    }
}

/// Maps a variable name to its node id. Reads and writes must agree on
/// this mapping.
fn variable_node(name: &str) -> NodeId {
    NodeId::string(VARIABLE_NAMESPACE, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_node_mapping() {
        let node = variable_node("Machine.Speed");
        assert_eq!(node, NodeId::string(2, "Machine.Speed"));
        // Read and write paths share this function, so the same name always
        // addresses the same node.
        assert_eq!(variable_node("x"), variable_node("x"));
    }
}

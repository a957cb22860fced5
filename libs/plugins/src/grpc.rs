//! gRPC plugin transport.
//!
//! Plugins are unary gRPC servers answering `/hyrp.Plugin/OnConnect`
//! with a JSON codec: both request and response are plain JSON bodies
//! inside standard gRPC framing, so plugin authors need no proto
//! toolchain.

use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::{Buf, BufMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tonic::codec::{BufferSettings, Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use crate::types::{ConnectRequest, ConnectResponse, Plugin};
use crate::PluginError;

const ON_CONNECT_PATH: &str = "/hyrp.Plugin/OnConnect";

/// Serde-JSON codec for tonic.
#[derive(Debug, Clone)]
pub struct JsonCodec<E, D> {
    _marker: PhantomData<fn(E) -> D>,
}

impl<E, D> Default for JsonCodec<E, D> {
    fn default() -> Self {
        JsonCodec {
            _marker: PhantomData,
        }
    }
}

impl<E, D> Codec for JsonCodec<E, D>
where
    E: Serialize + Send + 'static,
    D: DeserializeOwned + Send + 'static,
{
    type Encode = E;
    type Decode = D;
    type Encoder = JsonEncoder<E>;
    type Decoder = JsonDecoder<D>;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(PhantomData)
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(PhantomData)
    }
}

pub struct JsonEncoder<E>(PhantomData<E>);

impl<E: Serialize> Encoder for JsonEncoder<E> {
    type Item = E;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, buf: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        let bytes = serde_json::to_vec(&item).map_err(|e| Status::internal(e.to_string()))?;
        buf.put_slice(&bytes);
        Ok(())
    }

    fn buffer_settings(&self) -> BufferSettings {
        BufferSettings::default()
    }
}

pub struct JsonDecoder<D>(PhantomData<D>);

impl<D: DeserializeOwned> Decoder for JsonDecoder<D> {
    type Item = D;
    type Error = Status;

    fn decode(&mut self, buf: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let bytes = buf.copy_to_bytes(buf.remaining());
        let item = serde_json::from_slice(&bytes).map_err(|e| Status::internal(e.to_string()))?;
        Ok(Some(item))
    }

    fn buffer_settings(&self) -> BufferSettings {
        BufferSettings::default()
    }
}

/// A plugin backed by a remote gRPC server.
pub struct GrpcPlugin {
    name: String,
    grpc: tokio::sync::Mutex<tonic::client::Grpc<Channel>>,
}

impl GrpcPlugin {
    /// Connect lazily to `address`; the channel dials on first use.
    pub fn connect(name: impl Into<String>, address: &str) -> Result<Self, PluginError> {
        let name = name.into();
        let endpoint =
            Endpoint::from_shared(normalize_endpoint(address)).map_err(|e| {
                PluginError::LoadFailed {
                    name: name.clone(),
                    message: e.to_string(),
                }
            })?;
        let channel = endpoint.connect_lazy();
        Ok(GrpcPlugin {
            name,
            grpc: tokio::sync::Mutex::new(tonic::client::Grpc::new(channel)),
        })
    }
}

#[async_trait]
impl Plugin for GrpcPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_connect(&self, req: ConnectRequest) -> Result<ConnectResponse, PluginError> {
        let mut grpc = self.grpc.lock().await;
        grpc.ready()
            .await
            .map_err(|e| PluginError::CallFailed(e.to_string()))?;
        let codec = JsonCodec::<ConnectRequest, ConnectResponse>::default();
        let path = PathAndQuery::from_static(ON_CONNECT_PATH);
        let response = grpc
            .unary(Request::new(req), path, codec)
            .await
            .map_err(|e| PluginError::CallFailed(e.to_string()))?;
        Ok(response.into_inner())
    }

    async fn close(&self) -> Result<(), PluginError> {
        // Dropping the channel tears the connection down.
        Ok(())
    }
}

/// Bare `host:port` addresses dial in the clear, matching the plugin
/// contract's plaintext default.
fn normalize_endpoint(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_addresses() {
        assert_eq!(normalize_endpoint("127.0.0.1:7777"), "http://127.0.0.1:7777");
        assert_eq!(
            normalize_endpoint("https://plugins.example.com"),
            "https://plugins.example.com"
        );
    }

    #[test]
    fn connect_rejects_invalid_address() {
        assert!(GrpcPlugin::connect("p", "not a uri").is_err());
    }

    #[tokio::test]
    async fn connect_accepts_lazy_endpoint() {
        // No server needs to listen; the channel dials on first call.
        let p = GrpcPlugin::connect("p", "127.0.0.1:1").unwrap();
        assert_eq!(p.name(), "p");
    }
}

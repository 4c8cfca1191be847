//! Relay queue backend
//!
//! Queues are reached through a coordinator's HTTP API. Every operation is
//! a GET on `/yacy/grid/mcp/messages/<op>.json` with flat query parameters,
//! answered by a [`RelayResponse`] envelope.

use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use crate::queue::error::{BrokerError, BrokerResult, TARGET_LIMIT_MESSAGE};
use crate::queue::traits::{Delivery, Queue, QueueFactory};
use crate::services::{QueueName, Service};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

const MESSAGES_PATH: &str = "/yacy/grid/mcp/messages";
const STATUS_PATH: &str = "/yacy/grid/mcp/info/status.json";
const TIMEOUT_COMMENT: &str = "timeout";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response envelope of the coordinator API
///
/// `success` is mandatory; an answer without it is not an envelope. The
/// same shape is used by the index and asset relays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_tag: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<usize>,
}

impl RelayResponse {
    pub fn parse(body: &str) -> BrokerResult<Self> {
        serde_json::from_str(body).map_err(|e| BrokerError::Codec {
            message: format!("relay answer is not an envelope: {}", e),
        })
    }

    pub fn is_target_limit(&self) -> bool {
        !self.success
            && self
                .comment
                .as_deref()
                .is_some_and(|c| c.starts_with(TARGET_LIMIT_MESSAGE))
    }

    pub fn is_timeout(&self) -> bool {
        !self.success && self.comment.as_deref() == Some(TIMEOUT_COMMENT)
    }

    /// The `service` field when it names an HTTP endpoint to use from now on
    pub fn adopted_base_url(&self) -> Option<&str> {
        self.service
            .as_deref()
            .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
            .map(|s| s.trim_end_matches('/'))
    }
}

/// Turn a configured `host[:port]` into a base URL
///
/// A missing scheme becomes `http://` and a missing port the coordinator's
/// default port.
pub fn relay_base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    let (scheme, rest) = match address.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", address),
    };
    let host = rest.split('/').next().unwrap_or(rest);
    if host.contains(':') {
        format!("{}://{}", scheme, rest)
    } else {
        format!("{}://{}:{}", scheme, rest, Service::Mcp.default_port())
    }
}

pub(crate) fn http_client() -> BrokerResult<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| BrokerError::Http {
            address: "(client)".to_string(),
            source: e,
        })
}

/// Check that a coordinator answers at `base_url`
pub fn probe_relay(client: &reqwest::blocking::Client, base_url: &str) -> BrokerResult<()> {
    let url = format!("{}{}", base_url, STATUS_PATH);
    let response = client
        .get(&url)
        .timeout(CONNECT_TIMEOUT)
        .send()
        .map_err(|e| BrokerError::Http {
            address: base_url.to_string(),
            source: e,
        })?;
    response.error_for_status().map_err(|e| BrokerError::Http {
        address: base_url.to_string(),
        source: e,
    })?;
    Ok(())
}

#[derive(Debug)]
struct RelayEndpoint {
    service: Service,
    base_url: RwLock<String>,
    client: reqwest::blocking::Client,
    closed: AtomicBool,
}

impl RelayEndpoint {
    fn base_url(&self) -> BrokerResult<String> {
        Ok(handle_rwlock_read(self.base_url.read(), BrokerError::poisoned)?.clone())
    }

    fn call(
        &self,
        operation: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> BrokerResult<RelayResponse> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        let base_url = self.base_url()?;
        let url = format!("{}{}/{}.json", base_url, MESSAGES_PATH, operation);
        let http_error = |source| BrokerError::Http {
            address: base_url.clone(),
            source,
        };

        let body = self
            .client
            .get(&url)
            .query(&[("serviceName", self.service.as_ref())])
            .query(params)
            .timeout(timeout)
            .send()
            .and_then(|response| response.text())
            .map_err(http_error)?;
        let envelope = RelayResponse::parse(&body)?;

        if let Some(adopted) = envelope.adopted_base_url() {
            if adopted != base_url {
                log::info!("Relay {} redirects {} to {}", base_url, self.service, adopted);
                *handle_rwlock_write(self.base_url.write(), BrokerError::poisoned)? =
                    adopted.to_string();
            }
        }
        Ok(envelope)
    }

    fn expect_success(
        &self,
        operation: &str,
        queue: &QueueName,
        envelope: RelayResponse,
    ) -> BrokerResult<RelayResponse> {
        if envelope.success {
            return Ok(envelope);
        }
        if envelope.is_target_limit() {
            return Err(BrokerError::TargetLimit {
                service: self.service,
                queue: queue.clone(),
            });
        }
        Err(BrokerError::Relay {
            address: self.base_url()?,
            operation: operation.to_string(),
            comment: envelope
                .comment
                .unwrap_or_else(|| "no success and no comment".to_string()),
        })
    }
}

/// A queue on the coordinator; holds no local state
#[derive(Debug)]
pub struct RelayQueue {
    endpoint: Arc<RelayEndpoint>,
    name: QueueName,
}

impl RelayQueue {
    fn call(&self, operation: &str, extra: &[(&str, String)]) -> BrokerResult<RelayResponse> {
        self.call_with_timeout(operation, extra, REQUEST_TIMEOUT)
    }

    fn call_with_timeout(
        &self,
        operation: &str,
        extra: &[(&str, String)],
        timeout: Duration,
    ) -> BrokerResult<RelayResponse> {
        let mut params = vec![("queueName", self.name.to_string())];
        params.extend(extra.iter().cloned());
        let envelope = self.endpoint.call(operation, &params, timeout)?;
        self.endpoint.expect_success(operation, &self.name, envelope)
    }
}

impl Queue for RelayQueue {
    fn name(&self) -> &QueueName {
        &self.name
    }

    fn send(&self, payload: &[u8]) -> BrokerResult<()> {
        let message = String::from_utf8(payload.to_vec()).map_err(|e| BrokerError::Codec {
            message: format!("payload for {} is not UTF-8: {}", self.name, e),
        })?;
        self.call("send", &[("message", message)])?;
        Ok(())
    }

    fn receive(&self, timeout: Duration, auto_ack: bool) -> BrokerResult<Option<Delivery>> {
        let mut params = vec![("queueName", self.name.to_string())];
        params.push(("timeout", timeout.as_millis().to_string()));
        params.push(("autoAck", auto_ack.to_string()));

        let envelope = self
            .endpoint
            .call("receive", &params, timeout + REQUEST_TIMEOUT)?;
        if envelope.is_timeout() {
            return Ok(None);
        }
        let envelope = self.endpoint.expect_success("receive", &self.name, envelope)?;
        Ok(envelope.message.filter(|m| !m.is_empty()).map(|message| Delivery {
            payload: message.into_bytes(),
            tag: if auto_ack {
                0
            } else {
                envelope.delivery_tag.unwrap_or(0)
            },
        }))
    }

    fn acknowledge(&self, tag: u64) -> BrokerResult<()> {
        self.call("acknowledge", &[("deliveryTag", tag.to_string())])?;
        Ok(())
    }

    fn reject(&self, tag: u64) -> BrokerResult<()> {
        self.call("reject", &[("deliveryTag", tag.to_string())])?;
        Ok(())
    }

    fn recover(&self) -> BrokerResult<usize> {
        Ok(self.call("recover", &[])?.available.unwrap_or(0))
    }

    fn available(&self) -> BrokerResult<usize> {
        self.call("available", &[])?
            .available
            .ok_or_else(|| BrokerError::Codec {
                message: "relay answer to available has no count".to_string(),
            })
    }

    fn clear(&self) -> BrokerResult<()> {
        self.call("clear", &[])?;
        Ok(())
    }
}

/// Queues of one service behind one coordinator address
#[derive(Debug)]
pub struct RelayQueueFactory {
    endpoint: Arc<RelayEndpoint>,
}

impl RelayQueueFactory {
    pub fn new(client: reqwest::blocking::Client, base_url: impl Into<String>, service: Service) -> Self {
        Self {
            endpoint: Arc::new(RelayEndpoint {
                service,
                base_url: RwLock::new(base_url.into()),
                client,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl QueueFactory for RelayQueueFactory {
    fn service(&self) -> Service {
        self.endpoint.service
    }

    fn connection_url(&self) -> String {
        self.endpoint
            .base_url()
            .unwrap_or_else(|_| "(unavailable)".to_string())
    }

    fn get_queue(&self, name: &QueueName) -> BrokerResult<Arc<dyn Queue>> {
        if self.endpoint.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        Ok(Arc::new(RelayQueue {
            endpoint: self.endpoint.clone(),
            name: name.clone(),
        }))
    }

    fn close(&self) {
        self.endpoint.closed.store(true, Ordering::Release);
    }
}

//! Pipeline stage registry

use crate::services::QueueName;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A pipeline stage
///
/// Names are lowercase on the wire and parse case-insensitively.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Service {
    /// Coordinator; hosts the embedded broker for peers without one
    Mcp,
    Crawler,
    Loader,
    Warcmanager,
    Parser,
    Indexer,
}

impl Service {
    pub fn default_port(self) -> u16 {
        match self {
            Service::Mcp => 8100,
            Service::Loader => 8200,
            Service::Crawler => 8300,
            Service::Warcmanager => 8400,
            Service::Parser => 8500,
            Service::Indexer => 8600,
        }
    }

    /// Queues this service consumes, in listener start order
    pub fn source_queues(self) -> Vec<QueueName> {
        let names: &[&'static str] = match self {
            Service::Mcp => &[],
            Service::Crawler => &["crawler_webcrawler_00", "crawler_webcrawler_01"],
            Service::Loader => &["webloader_00"],
            Service::Warcmanager => &["warcmanager_00"],
            Service::Parser => &["yacyparser_00"],
            Service::Indexer => &["elasticsearch_00"],
        };
        names.iter().map(|n| QueueName::from_static(n)).collect()
    }

    /// Services this one may forward follow-up actions to
    pub fn target_services(self) -> &'static [Service] {
        match self {
            Service::Mcp => &[],
            Service::Crawler => &[Service::Loader],
            Service::Loader => &[Service::Parser, Service::Warcmanager],
            Service::Warcmanager => &[],
            Service::Parser => &[Service::Indexer, Service::Crawler],
            Service::Indexer => &[],
        }
    }

    pub fn all() -> impl Iterator<Item = Service> {
        Service::iter()
    }
}

impl Serialize for Service {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl<'de> Deserialize<'de> for Service {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse::<Service>()
            .map_err(|_| serde::de::Error::custom(format!("unknown service '{}'", name)))
    }
}

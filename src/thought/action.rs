//! One workflow step addressed to a service queue

use crate::services::{QueueName, Service};
use crate::thought::error::ActionError;
use serde_json::{Map, Value};

const TYPE_KEY: &str = "type";
const QUEUE_KEY: &str = "queue";
const ACTIONS_KEY: &str = "actions";

/// A parsed action
///
/// `attributes` holds every key other than `type`, `queue` and `actions`,
/// untouched. Nested actions stay raw JSON; each is parsed only when it is
/// forwarded, so one malformed follow-up does not spoil its siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    service: Service,
    queue: QueueName,
    attributes: Map<String, Value>,
    actions: Vec<Value>,
}

impl Action {
    pub fn new(service: Service, queue: QueueName) -> Self {
        Self {
            service,
            queue,
            attributes: Map::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if ![TYPE_KEY, QUEUE_KEY, ACTIONS_KEY].contains(&key.as_str()) {
            self.attributes.insert(key, value.into());
        }
        self
    }

    /// Append a follow-up to run after this action succeeds
    pub fn with_action(mut self, action: &Action) -> Self {
        self.actions.push(action.to_value());
        self
    }

    pub fn from_value(value: &Value) -> Result<Self, ActionError> {
        let object = value.as_object().ok_or(ActionError::NotAnObject)?;

        let type_name = object
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ActionError::MissingType)?;
        let service = type_name
            .parse::<Service>()
            .map_err(|_| ActionError::UnknownType(type_name.to_string()))?;

        let queue = object
            .get(QUEUE_KEY)
            .and_then(Value::as_str)
            .ok_or(ActionError::MissingQueue)?;
        let queue = QueueName::new(queue)?;

        let actions = match object.get(ACTIONS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(actions)) => actions.clone(),
            Some(_) => return Err(ActionError::InvalidNestedActions),
        };

        let attributes = object
            .iter()
            .filter(|(k, _)| ![TYPE_KEY, QUEUE_KEY, ACTIONS_KEY].contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            service,
            queue,
            attributes,
            actions,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.attributes.clone();
        object.insert(TYPE_KEY.to_string(), Value::from(self.service.as_ref()));
        object.insert(QUEUE_KEY.to_string(), Value::from(self.queue.as_str()));
        if !self.actions.is_empty() {
            object.insert(ACTIONS_KEY.to_string(), Value::Array(self.actions.clone()));
        }
        Value::Object(object)
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Raw nested follow-up actions
    pub fn actions(&self) -> &[Value] {
        &self.actions
    }
}

//! Component locators.
//!
//! A locator names a server-side component:
//! `(appName, moduleName, beanName, distinctName)`, where `appName` and
//! `distinctName` may be empty on the wire and `moduleName`/`beanName`
//! must not be. Stateful targets additionally carry the session id and
//! the routing affinity returned when the session was opened.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EjbwireError, Result};

/// Opaque routing hint returned by the server.
pub type Affinity = Value;

/// Locator of a stateless component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatelessLocator {
    app_name: String,
    module_name: String,
    bean_name: String,
    distinct_name: String,
}

impl StatelessLocator {
    /// Create a locator. `module_name` and `bean_name` must be non-empty;
    /// `app_name` and `distinct_name` may be empty.
    pub fn new(
        app_name: impl Into<String>,
        module_name: impl Into<String>,
        bean_name: impl Into<String>,
        distinct_name: impl Into<String>,
    ) -> Result<Self> {
        let locator = Self {
            app_name: app_name.into(),
            module_name: module_name.into(),
            bean_name: bean_name.into(),
            distinct_name: distinct_name.into(),
        };
        if locator.module_name.is_empty() || locator.bean_name.is_empty() {
            return Err(EjbwireError::Protocol(
                "locator module and bean names must be non-empty".to_string(),
            ));
        }
        Ok(locator)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    pub fn distinct_name(&self) -> &str {
        &self.distinct_name
    }

    pub(crate) fn to_wire_object(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Identifier of an open stateful session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(Vec<u8>);

impl SessionId {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Locator of an open stateful session: the originating stateless
/// locator plus the session identity the server handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatefulLocator {
    stateless: StatelessLocator,
    session_id: SessionId,
    affinity: Affinity,
}

impl StatefulLocator {
    pub fn new(stateless: StatelessLocator, session_id: SessionId, affinity: Affinity) -> Self {
        Self {
            stateless,
            session_id,
            affinity,
        }
    }

    pub fn stateless(&self) -> &StatelessLocator {
        &self.stateless
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn affinity(&self) -> &Affinity {
        &self.affinity
    }

    pub(crate) fn to_wire_object(&self) -> Result<Value> {
        let mut object = self.stateless.to_wire_object()?;
        if let Value::Object(map) = &mut object {
            let bytes = self
                .session_id
                .as_bytes()
                .iter()
                .map(|b| Value::from(*b))
                .collect();
            map.insert("sessionId".to_string(), Value::Array(bytes));
            map.insert("affinity".to_string(), self.affinity.clone());
        }
        Ok(object)
    }
}

/// Either kind of invocation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EjbLocator {
    Stateless(StatelessLocator),
    Stateful(StatefulLocator),
}

impl EjbLocator {
    fn stateless(&self) -> &StatelessLocator {
        match self {
            EjbLocator::Stateless(locator) => locator,
            EjbLocator::Stateful(locator) => locator.stateless(),
        }
    }

    pub fn app_name(&self) -> &str {
        self.stateless().app_name()
    }

    pub fn module_name(&self) -> &str {
        self.stateless().module_name()
    }

    pub fn bean_name(&self) -> &str {
        self.stateless().bean_name()
    }

    pub fn distinct_name(&self) -> &str {
        self.stateless().distinct_name()
    }

    pub(crate) fn to_wire_object(&self) -> Result<Value> {
        match self {
            EjbLocator::Stateless(locator) => locator.to_wire_object(),
            EjbLocator::Stateful(locator) => locator.to_wire_object(),
        }
    }
}

impl From<StatelessLocator> for EjbLocator {
    fn from(locator: StatelessLocator) -> Self {
        EjbLocator::Stateless(locator)
    }
}

impl From<StatefulLocator> for EjbLocator {
    fn from(locator: StatefulLocator) -> Self {
        EjbLocator::Stateful(locator)
    }
}

/// Identifies the invoked method: name plus declared parameter type
/// names, in declaration order.
///
/// On protocol version 3 this is written as one composite object; on
/// versions 1 and 2 it degrades to the method name and the comma-joined
/// signature string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodLocator {
    method_name: String,
    parameter_types: Vec<String>,
}

impl MethodLocator {
    pub fn new(method_name: impl Into<String>, parameter_types: Vec<String>) -> Self {
        Self {
            method_name: method_name.into(),
            parameter_types,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    /// Parameter type names joined by commas, no spaces.
    pub fn signature_string(&self) -> String {
        self.parameter_types.join(",")
    }

    pub(crate) fn to_wire_object(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

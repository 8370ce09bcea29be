//! Attributes fed by inbound events
//!
//! ## Attribute kinds
//!
//! - **MetricAttribute**: owns a recorder, updated by matching events, replicable
//!   across the cluster through snapshots
//! - **UnaryFunctionAttribute**: read-only, derived on demand from a sibling
//!   attribute resolved through the repository
//!
//! ## Dispatch contract
//!
//! Offering an event to an attribute yields a [`ProcessingResult`]. Errors are
//! never propagated out of `dispatch`; they are reported as
//! [`ProcessingResult::Failed`] and the repository carries on with the other
//! attributes.

pub mod metric;
pub mod processing;
pub mod registry;
pub mod repository;

use std::fmt;

use crate::descriptor::Descriptor;
use crate::error::{ConnectorError, ConnectorResult};
use crate::event::Event;

pub use metric::{EventMatcher, MetricAttribute};
pub use processing::{UnaryFunction, UnaryFunctionAttribute};
pub use registry::{AttributeRegistry, AttributeType, FactoryContext, MetricFamily};
pub use repository::{AttributeRepository, DEFAULT_BATCH_TIMEOUT};

/// Outcome of offering one event to one attribute
pub enum ProcessingResult {
    /// The event does not apply to the attribute
    Ignored,

    /// The event applied but could not be processed
    Failed(anyhow::Error),

    /// The attribute was updated; carries its new value
    Processed(serde_json::Value),
}

impl ProcessingResult {
    pub fn is_ignored(&self) -> bool {
        matches!(self, ProcessingResult::Ignored)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessingResult::Failed(_))
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, ProcessingResult::Processed(_))
    }
}

impl fmt::Debug for ProcessingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingResult::Ignored => write!(f, "Ignored"),
            ProcessingResult::Failed(e) => write!(f, "Failed({e:#})"),
            ProcessingResult::Processed(v) => write!(f, "Processed({v})"),
        }
    }
}

/// Access to sibling attributes by name
///
/// Implemented by the repository so derived attributes never hold references to
/// their sources.
pub trait AttributeResolver: Send + Sync {
    fn resolve_value(&self, requester: &str, name: &str) -> ConnectorResult<serde_json::Value>;
}

/// An attribute connected to a resource
pub trait Attribute: Send + Sync + 'static {
    /// Attribute id within the resource
    fn name(&self) -> &str;

    fn descriptor(&self) -> &Descriptor;

    /// Name of the attribute's structured type (the family selector)
    fn attribute_type(&self) -> &str;

    /// Whether the attribute is driven by events
    fn is_notification_enabled(&self) -> bool;

    fn dispatch(&self, _event: &Event) -> ProcessingResult {
        ProcessingResult::Ignored
    }

    fn read(&self, resolver: &dyn AttributeResolver) -> ConnectorResult<serde_json::Value>;

    fn write(&self, _value: serde_json::Value) -> ConnectorResult<()> {
        Err(ConnectorError::CannotBeModified(self.name().to_string()))
    }

    /// Replication capability, if the attribute has any replicable state
    fn as_distributed(&self) -> Option<&dyn DistributedAttribute> {
        None
    }

    /// Drop accumulated state
    fn reset(&self) {}

    /// Called once when the attribute is disconnected
    fn close(&self) {}
}

impl fmt::Debug for dyn Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name())
            .field("type", &self.attribute_type())
            .finish()
    }
}

/// Snapshot export and import for cluster synchronization
pub trait DistributedAttribute: Send + Sync {
    /// Capture the replicable state; `None` when there is nothing to replicate
    fn take_snapshot(&self) -> ConnectorResult<Option<serde_json::Value>>;

    /// Replace the state wholesale with `snapshot`
    ///
    /// Returns the revision observed while the new state was installed, so a
    /// modification racing the load is not mistaken for part of it.
    fn load_from_snapshot(&self, snapshot: serde_json::Value) -> ConnectorResult<u64>;

    /// Counter bumped on every local modification
    fn revision(&self) -> u64;
}

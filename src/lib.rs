//! Notification-driven metric attributes for monitored resources
//!
//! A [`Connector`] receives measurement notifications for one resource, keeps
//! statistics in event-driven [attributes](attribute), republishes touched
//! attributes and measurements to [event categories](notification) and
//! replicates attribute state across a [cluster](cluster).

pub mod attribute;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod connector;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod filter;
pub mod notification;
pub mod recorder;
pub mod util;

pub use attribute::{Attribute, AttributeRegistry, AttributeRepository, ProcessingResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cluster::{ClusterStore, InMemoryClusterStore, SynchronizerHandle};
pub use config::{ConnectorConfig, read_config_file};
pub use connector::{Connector, ConnectorBuilder, DispatchTicket, JsonNotificationParser};
pub use descriptor::Descriptor;
pub use error::{ConnectorError, ConnectorResult};
pub use event::{Event, Payload, Scalar};
pub use filter::NotificationFilter;
pub use notification::{EventRepository, ListenerId, NotificationListener};

//! Attribute type selection
//!
//! The `gauge` parameter of a descriptor selects the attribute type. The registry
//! maps every known type to a constructor that validates the descriptor and
//! builds the attribute.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::Attribute;
use super::metric::MetricAttribute;
use super::processing::UnaryFunctionAttribute;
use crate::clock::{Clock, SystemClock};
use crate::descriptor::{Descriptor, keys};
use crate::error::{ConnectorError, ConnectorResult};
use crate::recorder::{
    Arrivals, Flag, MetricRecorder, RangedGauge, RangedTimer, RatedGauge, StringGauge, Timer,
};

/// Statistical family of a metric attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    Gauge64,
    GaugeFp,
    RangedGauge64,
    RangedGaugeFp,
    Flag,
    StringGauge,
    Timer,
    RangedTimer,
    Arrivals,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 9] = [
        MetricFamily::Gauge64,
        MetricFamily::GaugeFp,
        MetricFamily::RangedGauge64,
        MetricFamily::RangedGaugeFp,
        MetricFamily::Flag,
        MetricFamily::StringGauge,
        MetricFamily::Timer,
        MetricFamily::RangedTimer,
        MetricFamily::Arrivals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricFamily::Gauge64 => "gauge64",
            MetricFamily::GaugeFp => "gaugeFP",
            MetricFamily::RangedGauge64 => "rangedGauge64",
            MetricFamily::RangedGaugeFp => "rangedGaugeFP",
            MetricFamily::Flag => "flag",
            MetricFamily::StringGauge => "stringGauge",
            MetricFamily::Timer => "timer",
            MetricFamily::RangedTimer => "rangedTimer",
            MetricFamily::Arrivals => "arrivals",
        }
    }

    /// Whether the family needs `from` and `to`
    pub fn is_ranged(self) -> bool {
        matches!(
            self,
            MetricFamily::RangedGauge64 | MetricFamily::RangedGaugeFp | MetricFamily::RangedTimer
        )
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type selected by the `gauge` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Metric(MetricFamily),
    /// Read-only projection of another attribute
    Extract,
}

impl AttributeType {
    pub const EXTRACT: &'static str = "extract";

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeType::Metric(family) => family.as_str(),
            AttributeType::Extract => Self::EXTRACT,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(Self::EXTRACT) {
            return Ok(AttributeType::Extract);
        }
        MetricFamily::ALL
            .into_iter()
            .find(|family| family.as_str().eq_ignore_ascii_case(s))
            .map(AttributeType::Metric)
            .ok_or_else(|| ConnectorError::UnrecognizedAttributeType(s.to_string()))
    }
}

/// Shared services handed to attribute constructors
#[derive(Clone)]
pub struct FactoryContext {
    pub clock: Arc<dyn Clock>,
}

impl FactoryContext {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for FactoryContext {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Constructor of one attribute type
pub type AttributeFactory =
    fn(&str, &Descriptor, &FactoryContext) -> ConnectorResult<Arc<dyn Attribute>>;

/// Known attribute types and their constructors
#[derive(Clone)]
pub struct AttributeRegistry {
    factories: HashMap<AttributeType, AttributeFactory>,
}

impl AttributeRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every metric family and the extract projection
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(AttributeType::Metric(MetricFamily::Gauge64), gauge64)
            .register(AttributeType::Metric(MetricFamily::GaugeFp), gauge_fp)
            .register(AttributeType::Metric(MetricFamily::RangedGauge64), ranged_gauge64)
            .register(AttributeType::Metric(MetricFamily::RangedGaugeFp), ranged_gauge_fp)
            .register(AttributeType::Metric(MetricFamily::Flag), flag)
            .register(AttributeType::Metric(MetricFamily::StringGauge), string_gauge)
            .register(AttributeType::Metric(MetricFamily::Timer), timer)
            .register(AttributeType::Metric(MetricFamily::RangedTimer), ranged_timer)
            .register(AttributeType::Metric(MetricFamily::Arrivals), arrivals)
            .register(AttributeType::Extract, extract);
        registry
    }

    pub fn register(&mut self, ty: AttributeType, factory: AttributeFactory) -> &mut Self {
        self.factories.insert(ty, factory);
        self
    }

    /// Attribute type selected by the descriptor
    pub fn resolve(&self, name: &str, descriptor: &Descriptor) -> ConnectorResult<AttributeType> {
        let selector = descriptor
            .gauge()
            .ok_or_else(|| ConnectorError::missing(name, keys::GAUGE))?;
        let ty: AttributeType = selector.parse()?;
        if !self.factories.contains_key(&ty) {
            return Err(ConnectorError::UnrecognizedAttributeType(selector.to_string()));
        }
        Ok(ty)
    }

    /// Build the attribute `name` from its descriptor
    pub fn create(
        &self,
        name: &str,
        descriptor: &Descriptor,
        context: &FactoryContext,
    ) -> ConnectorResult<Arc<dyn Attribute>> {
        let ty = self.resolve(name, descriptor)?;
        let factory = self
            .factories
            .get(&ty)
            .ok_or_else(|| ConnectorError::UnrecognizedAttributeType(ty.to_string()))?;
        factory(name, descriptor, context)
    }

    /// Check a descriptor without keeping the attribute
    pub fn validate(&self, name: &str, descriptor: &Descriptor) -> ConnectorResult<()> {
        self.create(name, descriptor, &FactoryContext::default())
            .map(|_| ())
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn metric(
    name: &str,
    family: MetricFamily,
    descriptor: &Descriptor,
    context: &FactoryContext,
    recorder: Box<dyn MetricRecorder>,
) -> ConnectorResult<Arc<dyn Attribute>> {
    Ok(Arc::new(MetricAttribute::new(
        name,
        family,
        descriptor.clone(),
        recorder,
        context.clock.clone(),
    )?))
}

/// `from` and `to` of a ranged family; `from` may not exceed `to`
fn range<T>(name: &str, descriptor: &Descriptor) -> ConnectorResult<(T, T)>
where
    T: FromStr + PartialOrd,
    T::Err: fmt::Display,
{
    let from: T = descriptor.parse_required(name, keys::FROM)?;
    let to: T = descriptor.parse_required(name, keys::TO)?;
    check_order(&from, &to, descriptor)?;
    Ok((from, to))
}

fn duration_range(name: &str, descriptor: &Descriptor) -> ConnectorResult<(Duration, Duration)> {
    let from = descriptor.duration_required(name, keys::FROM)?;
    let to = descriptor.duration_required(name, keys::TO)?;
    check_order(&from, &to, descriptor)?;
    Ok((from, to))
}

fn check_order<T: PartialOrd>(from: &T, to: &T, descriptor: &Descriptor) -> ConnectorResult<()> {
    // NaN bounds compare false both ways and are rejected here too
    if from <= to {
        return Ok(());
    }
    Err(ConnectorError::invalid(
        keys::TO,
        descriptor.get(keys::TO).unwrap_or_default(),
        format!(
            "range end is below range start '{}'",
            descriptor.get(keys::FROM).unwrap_or_default()
        ),
    ))
}

fn gauge64(name: &str, d: &Descriptor, cx: &FactoryContext) -> ConnectorResult<Arc<dyn Attribute>> {
    metric(name, MetricFamily::Gauge64, d, cx, Box::new(RatedGauge::<i64>::new()))
}

fn gauge_fp(name: &str, d: &Descriptor, cx: &FactoryContext) -> ConnectorResult<Arc<dyn Attribute>> {
    metric(name, MetricFamily::GaugeFp, d, cx, Box::new(RatedGauge::<f64>::new()))
}

fn ranged_gauge64(
    name: &str,
    d: &Descriptor,
    cx: &FactoryContext,
) -> ConnectorResult<Arc<dyn Attribute>> {
    let (from, to) = range::<i64>(name, d)?;
    metric(name, MetricFamily::RangedGauge64, d, cx, Box::new(RangedGauge::new(from, to)))
}

fn ranged_gauge_fp(
    name: &str,
    d: &Descriptor,
    cx: &FactoryContext,
) -> ConnectorResult<Arc<dyn Attribute>> {
    let (from, to) = range::<f64>(name, d)?;
    metric(name, MetricFamily::RangedGaugeFp, d, cx, Box::new(RangedGauge::new(from, to)))
}

fn flag(name: &str, d: &Descriptor, cx: &FactoryContext) -> ConnectorResult<Arc<dyn Attribute>> {
    metric(name, MetricFamily::Flag, d, cx, Box::new(Flag::new()))
}

fn string_gauge(
    name: &str,
    d: &Descriptor,
    cx: &FactoryContext,
) -> ConnectorResult<Arc<dyn Attribute>> {
    metric(name, MetricFamily::StringGauge, d, cx, Box::new(StringGauge::new()))
}

fn timer(name: &str, d: &Descriptor, cx: &FactoryContext) -> ConnectorResult<Arc<dyn Attribute>> {
    metric(name, MetricFamily::Timer, d, cx, Box::new(Timer::new()))
}

fn ranged_timer(
    name: &str,
    d: &Descriptor,
    cx: &FactoryContext,
) -> ConnectorResult<Arc<dyn Attribute>> {
    let (from, to) = duration_range(name, d)?;
    metric(name, MetricFamily::RangedTimer, d, cx, Box::new(RangedTimer::new(from, to)))
}

fn arrivals(name: &str, d: &Descriptor, cx: &FactoryContext) -> ConnectorResult<Arc<dyn Attribute>> {
    let channels = d.channels()?;
    metric(name, MetricFamily::Arrivals, d, cx, Box::new(Arrivals::new(channels)))
}

fn extract(name: &str, d: &Descriptor, _: &FactoryContext) -> ConnectorResult<Arc<dyn Attribute>> {
    Ok(Arc::new(UnaryFunctionAttribute::from_descriptor(name, d.clone())?))
}

//! Processing attributes
//!
//! Read-only attributes computed on demand from the value of a sibling metric
//! attribute, looked up by name through the repository.

use serde_json::Value;

use super::registry::AttributeType;
use super::{Attribute, AttributeResolver};
use crate::descriptor::{Descriptor, keys};
use crate::error::{ConnectorError, ConnectorResult};

/// Projection applied to the value of a source attribute
///
/// Selects a field by dotted path (array elements by index), then optionally
/// multiplies a numeric result by a scale factor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnaryFunction {
    path: Vec<String>,
    scale: Option<f64>,
}

impl UnaryFunction {
    pub fn new(field: Option<&str>, scale: Option<f64>) -> Self {
        let path = field
            .map(|f| {
                f.split('.')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Self { path, scale }
    }

    pub fn apply(&self, value: &Value) -> Result<Value, String> {
        let mut current = value;
        for segment in &self.path {
            current = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| format!("no field '{segment}' in {current}"))?;
        }

        match self.scale {
            None => Ok(current.clone()),
            Some(_) if current.is_null() => Ok(Value::Null),
            Some(scale) => {
                let number = current
                    .as_f64()
                    .ok_or_else(|| format!("cannot scale non-numeric value {current}"))?;
                serde_json::Number::from_f64(number * scale)
                    .map(Value::Number)
                    .ok_or_else(|| format!("scaling {number} by {scale} is not finite"))
            }
        }
    }
}

/// Read-only attribute derived from another attribute of the same resource
///
/// The source is looked up through the repository on every read, so the
/// attribute never holds a reference to it.
#[derive(Debug)]
pub struct UnaryFunctionAttribute {
    name: String,
    descriptor: Descriptor,
    source: String,
    function: UnaryFunction,
}

impl UnaryFunctionAttribute {
    pub fn from_descriptor(name: &str, descriptor: Descriptor) -> ConnectorResult<Self> {
        let source: String = descriptor.parse_required(name, keys::SOURCE)?;
        if source == name {
            return Err(ConnectorError::invalid(
                keys::SOURCE,
                source,
                "attribute cannot derive from itself",
            ));
        }
        let scale: Option<f64> = descriptor.parse_optional(keys::SCALE)?;
        if scale.is_some_and(|s| !s.is_finite()) {
            return Err(ConnectorError::invalid(
                keys::SCALE,
                descriptor.get(keys::SCALE).unwrap_or_default(),
                "must be a finite number",
            ));
        }
        let function = UnaryFunction::new(descriptor.get(keys::FIELD), scale);

        Ok(Self {
            name: name.to_string(),
            descriptor,
            source,
            function,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Attribute for UnaryFunctionAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn attribute_type(&self) -> &str {
        AttributeType::EXTRACT
    }

    fn is_notification_enabled(&self) -> bool {
        false
    }

    fn read(&self, resolver: &dyn AttributeResolver) -> ConnectorResult<Value> {
        let value = resolver.resolve_value(&self.name, &self.source)?;
        self.function
            .apply(&value)
            .map_err(|reason| ConnectorError::InvalidValue {
                attribute: self.name.clone(),
                reason,
            })
    }
}

//! Sensor descriptors attached to components after construction
//!
//! A component learns which logical sensors it carries separately from its
//! physical discovery: a temperature hub is registered first, then hub-level
//! and board-level enumeration each append the zones they know about.
//! Insertion order is the reporting order. Duplicate names are kept.

use serde::{Deserialize, Serialize};

use crate::constants::kernel::MILLIDEGREE_SCALE;

/// Where a sensor's value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSource {
    /// Index into the owning component's driver list
    pub driver: usize,
    /// Attribute read from that driver
    pub field: String,
    /// Multiplier applied to the raw attribute value
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// A named derivation rule producing one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub source: SensorSource,
}

impl SensorDescriptor {
    pub fn new(name: impl Into<String>, driver: usize, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: SensorSource {
                driver,
                field: field.into(),
                scale: default_scale(),
            },
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.source.scale = scale;
        self
    }

    /// hwmon temperature channel `channel` on driver `driver`, in °C
    pub fn temperature(name: impl Into<String>, driver: usize, channel: usize) -> Self {
        Self::new(name, driver, format!("temp{}_input", channel)).with_scale(MILLIDEGREE_SCALE)
    }

    /// Apply the derivation rule to a raw attribute value
    pub fn derive(&self, raw: i64) -> f64 {
        raw as f64 * self.source.scale
    }
}

/// One derived value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub name: String,
    pub value: f64,
}

/// Ordered, append-only sensor list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSet {
    descriptors: Vec<SensorDescriptor>,
    temp_channels: usize,
}

impl SensorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I>(&mut self, descriptors: I)
    where
        I: IntoIterator<Item = SensorDescriptor>,
    {
        self.descriptors.extend(descriptors);
    }

    /// Append temperature zones, each on the next hwmon channel of driver 0
    pub fn extend_temperatures<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.temp_channels += 1;
            self.descriptors
                .push(SensorDescriptor::temperature(name, 0, self.temp_channels));
        }
    }

    pub fn get(&self, name: &str) -> Option<&SensorDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SensorDescriptor> {
        self.descriptors.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    pub fn as_slice(&self) -> &[SensorDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

//! Parameter Synchronizer
//!
//! Registers the interface's configuration variables with the host's
//! [`ParameterStore`] and keeps a local cache of their values.
//!
//! # Parameters
//!
//! | id | name              | type   | consumed                          |
//! |----|-------------------|--------|-----------------------------------|
//! | 0  | `serial_name`     | string | next device open                  |
//! | 1  | `sensor_id`       | int    | next sample                       |
//! | 2  | `coordinate_frame`| string | next published message            |
//! | 3  | `update_rate_ms`  | int    | next live poll (clamped)          |
//! | 4  | `publish_enabled` | bool   | next published message            |
//!
//! The store may replace a default with a persisted value while registering,
//! so values are read back right after registration rather than pushed.

use crate::device::{clamp_rate_ms, DEFAULT_UPDATE_RATE_MS, MAX_UPDATE_RATE_MS, MIN_UPDATE_RATE_MS};
use crate::host::ParameterStore;
use crate::{PalError, Result};

/// Largest sensor id; ids travel through the store as `ParamValue::Int`.
pub const MAX_SENSOR_ID: u32 = i32::MAX as u32;

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    String(String),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::String(_) => "string",
        }
    }
}

bitflags::bitflags! {
    /// How a parameter change takes effect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamFlags: u8 {
        /// Read on next use, nothing happens at set time.
        const LAZY = 1 << 0;
        /// Only takes effect when the device is next opened.
        const ON_OPEN = 1 << 1;
    }
}

/// What the host needs to know to expose one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub id: u16,
    pub name: &'static str,
    pub description: &'static str,
    pub default: ParamValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub flags: ParamFlags,
}

/// Keys of the synchronized variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKey {
    SerialName = 0,
    SensorId = 1,
    CoordinateFrame = 2,
    UpdateRateMs = 3,
    PublishEnabled = 4,
}

impl ParamKey {
    pub const ALL: [ParamKey; 5] = [
        ParamKey::SerialName,
        ParamKey::SensorId,
        ParamKey::CoordinateFrame,
        ParamKey::UpdateRateMs,
        ParamKey::PublishEnabled,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParamKey::SerialName => "serial_name",
            ParamKey::SensorId => "sensor_id",
            ParamKey::CoordinateFrame => "coordinate_frame",
            ParamKey::UpdateRateMs => "update_rate_ms",
            ParamKey::PublishEnabled => "publish_enabled",
        }
    }

    pub fn from_name(name: &str) -> Option<ParamKey> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// The interface's configuration variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigVariables {
    /// Serial number of the device to open; empty opens the first found.
    pub serial_name: String,
    pub sensor_id: u32,
    pub coordinate_frame: String,
    pub update_rate_ms: u32,
    pub publish_enabled: bool,
}

impl Default for ConfigVariables {
    fn default() -> Self {
        Self {
            serial_name: String::new(),
            sensor_id: 0,
            coordinate_frame: "imu".to_string(),
            update_rate_ms: DEFAULT_UPDATE_RATE_MS,
            publish_enabled: true,
        }
    }
}

impl ConfigVariables {
    pub fn value(&self, key: ParamKey) -> ParamValue {
        match key {
            ParamKey::SerialName => ParamValue::String(self.serial_name.clone()),
            ParamKey::SensorId => ParamValue::Int(i32::try_from(self.sensor_id).unwrap_or(i32::MAX)),
            ParamKey::CoordinateFrame => ParamValue::String(self.coordinate_frame.clone()),
            ParamKey::UpdateRateMs => ParamValue::Int(i32::try_from(self.update_rate_ms).unwrap_or(i32::MAX)),
            ParamKey::PublishEnabled => ParamValue::Bool(self.publish_enabled),
        }
    }

    /// Store `value` under `key` after type and range checks.
    fn apply(&mut self, key: ParamKey, value: ParamValue) -> Result<()> {
        let mismatch = |v: &ParamValue| {
            PalError::Usage(format!(
                "parameter {} does not accept a {} value",
                key.name(),
                v.type_name()
            ))
        };

        match (key, value) {
            (ParamKey::SerialName, ParamValue::String(s)) => self.serial_name = s,
            (ParamKey::CoordinateFrame, ParamValue::String(s)) => {
                if s.is_empty() {
                    return Err(PalError::Usage("coordinate_frame must not be empty".into()));
                }
                self.coordinate_frame = s;
            }
            (ParamKey::SensorId, ParamValue::Int(v)) => {
                self.sensor_id = u32::try_from(v)
                    .map_err(|_| PalError::Usage(format!("sensor_id {} is negative", v)))?;
            }
            (ParamKey::UpdateRateMs, ParamValue::Int(v)) => {
                let requested = u32::try_from(v).unwrap_or(0);
                let clamped = clamp_rate_ms(requested);
                if clamped != requested {
                    log::warn!("update_rate_ms {} clamped to {}", v, clamped);
                }
                self.update_rate_ms = clamped;
            }
            (ParamKey::PublishEnabled, ParamValue::Bool(b)) => self.publish_enabled = b,
            (ParamKey::PublishEnabled, ParamValue::Int(v)) => self.publish_enabled = v != 0,
            (_, other) => return Err(mismatch(&other)),
        }
        Ok(())
    }
}

/// Describe every variable, using `defaults` for the default values.
pub fn descriptors(defaults: &ConfigVariables) -> Vec<ParamDescriptor> {
    ParamKey::ALL
        .into_iter()
        .map(|key| {
            let (description, min, max, step, flags) = match key {
                ParamKey::SerialName => (
                    "Serial number of the sensor to open (empty = first found)",
                    None,
                    None,
                    None,
                    ParamFlags::ON_OPEN,
                ),
                ParamKey::SensorId => (
                    "Sensor id stamped on samples and used to match replayed records",
                    Some(0.0),
                    Some(MAX_SENSOR_ID as f64),
                    Some(1.0),
                    ParamFlags::LAZY,
                ),
                ParamKey::CoordinateFrame => (
                    "Frame id of published messages",
                    None,
                    None,
                    None,
                    ParamFlags::LAZY,
                ),
                ParamKey::UpdateRateMs => (
                    "Sample interval in milliseconds",
                    Some(MIN_UPDATE_RATE_MS as f64),
                    Some(MAX_UPDATE_RATE_MS as f64),
                    Some(1.0),
                    ParamFlags::LAZY,
                ),
                ParamKey::PublishEnabled => (
                    "Publish samples on the message bus",
                    Some(0.0),
                    Some(1.0),
                    Some(1.0),
                    ParamFlags::LAZY,
                ),
            };
            ParamDescriptor {
                id: key as u16,
                name: key.name(),
                description,
                default: defaults.value(key),
                min,
                max,
                step,
                flags,
            }
        })
        .collect()
}

/// Local cache of the variables, kept in step with the host's store.
#[derive(Debug, Clone, Default)]
pub struct ParameterSync {
    vars: ConfigVariables,
    registered: bool,
}

impl ParameterSync {
    pub fn new(initial: ConfigVariables) -> Self {
        Self {
            vars: initial,
            registered: false,
        }
    }

    pub fn vars(&self) -> &ConfigVariables {
        &self.vars
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Register every variable, then pull the store's authoritative values.
    ///
    /// A persisted value of the wrong type is a configuration error.
    pub fn register(&mut self, store: &mut dyn ParameterStore) -> Result<()> {
        for descriptor in descriptors(&self.vars) {
            store.register(&descriptor)?;
        }

        for key in ParamKey::ALL {
            if let Some(value) = store.get(key.name()) {
                self.vars.apply(key, value).map_err(|e| {
                    PalError::Config(format!("persisted {}: {}", key.name(), e))
                })?;
            }
        }

        self.registered = true;
        log::debug!("Parameters registered: {:?}", self.vars);
        Ok(())
    }

    /// Accept an external set request and write it through to the store.
    pub fn set(&mut self, store: &mut dyn ParameterStore, name: &str, value: ParamValue) -> Result<()> {
        let key = ParamKey::from_name(name)
            .ok_or_else(|| PalError::Usage(format!("unknown parameter {}", name)))?;
        self.vars.apply(key, value)?;
        store.set(name, self.vars.value(key))?;
        log::info!("Parameter {} = {:?}", name, self.vars.value(key));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<ParamValue> {
        ParamKey::from_name(name)
            .map(|key| self.vars.value(key))
            .ok_or_else(|| PalError::Usage(format!("unknown parameter {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    #[test]
    fn test_descriptors_cover_all_keys() {
        let descs = descriptors(&ConfigVariables::default());
        assert_eq!(descs.len(), 5);
        for (i, d) in descs.iter().enumerate() {
            assert_eq!(d.id as usize, i);
            assert_eq!(ParamKey::from_name(d.name).map(|k| k as usize), Some(i));
        }
        let rate = &descs[ParamKey::UpdateRateMs as usize];
        assert_eq!(rate.min, Some(MIN_UPDATE_RATE_MS as f64));
        assert_eq!(rate.max, Some(MAX_UPDATE_RATE_MS as f64));
        assert_eq!(rate.default, ParamValue::Int(DEFAULT_UPDATE_RATE_MS as i32));
    }

    #[test]
    fn test_largest_sensor_id_survives_register() {
        let vars = ConfigVariables {
            sensor_id: MAX_SENSOR_ID,
            ..Default::default()
        };
        assert_eq!(vars.value(ParamKey::SensorId), ParamValue::Int(i32::MAX));

        let mut store = MemoryStore::default();
        let mut sync = ParameterSync::new(vars);
        sync.register(&mut store).unwrap();
        assert_eq!(sync.vars().sensor_id, MAX_SENSOR_ID);
    }

    #[test]
    fn test_register_pulls_persisted_values() {
        let mut store = MemoryStore::default();
        store.persist("update_rate_ms", ParamValue::Int(56));
        store.persist("coordinate_frame", ParamValue::String("base_imu".into()));

        let mut sync = ParameterSync::new(ConfigVariables::default());
        sync.register(&mut store).unwrap();

        assert!(sync.is_registered());
        assert_eq!(sync.vars().update_rate_ms, 56);
        assert_eq!(sync.vars().coordinate_frame, "base_imu");
        assert_eq!(sync.vars().sensor_id, 0);
        assert_eq!(store.registered().len(), 5);
    }

    #[test]
    fn test_register_rejects_persisted_type_mismatch() {
        let mut store = MemoryStore::default();
        store.persist("sensor_id", ParamValue::String("one".into()));
        let mut sync = ParameterSync::new(ConfigVariables::default());
        assert!(matches!(sync.register(&mut store), Err(PalError::Config(_))));
    }

    #[test]
    fn test_set_clamps_rate_and_writes_through() {
        let mut store = MemoryStore::default();
        let mut sync = ParameterSync::new(ConfigVariables::default());
        sync.register(&mut store).unwrap();

        sync.set(&mut store, "update_rate_ms", ParamValue::Int(1)).unwrap();
        assert_eq!(sync.vars().update_rate_ms, MIN_UPDATE_RATE_MS);
        assert_eq!(
            store.get("update_rate_ms"),
            Some(ParamValue::Int(MIN_UPDATE_RATE_MS as i32))
        );

        sync.set(&mut store, "update_rate_ms", ParamValue::Int(-5)).unwrap();
        assert_eq!(sync.vars().update_rate_ms, MIN_UPDATE_RATE_MS);
    }

    #[test]
    fn test_set_rejects_unknown_and_mistyped() {
        let mut store = MemoryStore::default();
        let mut sync = ParameterSync::new(ConfigVariables::default());

        assert!(matches!(
            sync.set(&mut store, "nope", ParamValue::Int(1)),
            Err(PalError::Usage(_))
        ));
        assert!(matches!(
            sync.set(&mut store, "publish_enabled", ParamValue::String("yes".into())),
            Err(PalError::Usage(_))
        ));
        assert!(matches!(
            sync.set(&mut store, "sensor_id", ParamValue::Int(-1)),
            Err(PalError::Usage(_))
        ));
        assert_eq!(sync.vars(), &ConfigVariables::default());
    }

    #[test]
    fn test_publish_enabled_accepts_int() {
        let mut store = MemoryStore::default();
        let mut sync = ParameterSync::new(ConfigVariables::default());
        sync.set(&mut store, "publish_enabled", ParamValue::Int(0)).unwrap();
        assert!(!sync.vars().publish_enabled);
        assert_eq!(sync.get("publish_enabled").unwrap(), ParamValue::Bool(false));
    }
}

//! Descriptions the interface exposes to the host: options, type support,
//! sensor identity and the minimal configuration tree.

use crate::config::InterfaceOptions;
use crate::params::ConfigVariables;
use crate::types::Channels;
use crate::{PalError, Result};
use clap::CommandFactory;
use serde::Serialize;

/// Message schemas this interface publishes.
pub const TYPE_SUPPORT: &[&str] = &["spatial.Header", "spatial.Imu"];

/// One interface-local option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionDescriptor {
    pub name: String,
    pub short: Option<char>,
    pub description: String,
    /// Usage string, e.g. `-r, --rate <MS>`.
    pub help: String,
}

/// Derive option descriptors from the clap definition of [`InterfaceOptions`].
pub fn options() -> Vec<OptionDescriptor> {
    InterfaceOptions::command()
        .get_arguments()
        .filter(|arg| !matches!(arg.get_id().as_str(), "help" | "version"))
        .map(|arg| {
            let mut help = String::new();
            if let Some(short) = arg.get_short() {
                help.push('-');
                help.push(short);
            }
            if let Some(long) = arg.get_long() {
                if !help.is_empty() {
                    help.push_str(", ");
                }
                help.push_str("--");
                help.push_str(long);
            }
            if let Some(names) = arg.get_value_names() {
                for name in names {
                    help.push_str(&format!(" <{}>", name));
                }
            }
            OptionDescriptor {
                name: arg.get_long().unwrap_or(arg.get_id().as_str()).to_string(),
                short: arg.get_short(),
                description: arg.get_help().map(|h| h.to_string()).unwrap_or_default(),
                help,
            }
        })
        .collect()
}

/// Device identity metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSupport {
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
    pub channels: Channels,
}

pub fn sensor_support() -> Vec<SensorSupport> {
    vec![SensorSupport {
        name: "spatial",
        kind: "imu",
        description: "USB HID 3-axis accelerometer and 3-axis gyroscope",
        channels: Channels::ACCELEROMETER | Channels::GYROSCOPE,
    }]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Element,
    Parameter,
}

/// A node of the minimal configuration tree.
///
/// Elements map to TOML tables, parameters to keys holding a default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigNode {
    pub name: String,
    pub kind: NodeKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<toml::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    fn element(name: &str, children: Vec<ConfigNode>) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Element,
            required: true,
            default: None,
            children,
        }
    }

    fn parameter(name: &str, default: toml::Value) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Parameter,
            required: true,
            default: Some(default),
            children: Vec::new(),
        }
    }

    /// Check that every required node under this root exists with the right shape.
    pub fn validate(&self, table: &toml::Table) -> Result<()> {
        for child in &self.children {
            child.validate_in(table, &self.name)?;
        }
        Ok(())
    }

    fn validate_in(&self, table: &toml::Table, parent: &str) -> Result<()> {
        let path = if parent.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", parent, self.name)
        };

        match (self.kind, table.get(&self.name)) {
            (_, None) if self.required => {
                Err(PalError::Config(format!("missing required {}", path)))
            }
            (_, None) => Ok(()),
            (NodeKind::Element, Some(toml::Value::Table(inner))) => {
                for child in &self.children {
                    child.validate_in(inner, &path)?;
                }
                Ok(())
            }
            (NodeKind::Element, Some(_)) => {
                Err(PalError::Config(format!("{} must be a table", path)))
            }
            (NodeKind::Parameter, Some(toml::Value::Table(_))) => {
                Err(PalError::Config(format!("{} must be a value", path)))
            }
            (NodeKind::Parameter, Some(_)) => Ok(()),
        }
    }

    /// Insert defaults for every missing node under this root.
    ///
    /// Entries of the wrong shape are left alone for `validate` to report.
    pub fn populate(&self, table: &mut toml::Table) {
        for child in &self.children {
            child.populate_in(table);
        }
    }

    fn populate_in(&self, table: &mut toml::Table) {
        match self.kind {
            NodeKind::Element => {
                let entry = table
                    .entry(self.name.clone())
                    .or_insert_with(|| toml::Value::Table(toml::Table::new()));
                if let toml::Value::Table(inner) = entry {
                    for child in &self.children {
                        child.populate_in(inner);
                    }
                }
            }
            NodeKind::Parameter => {
                if let Some(default) = &self.default {
                    table
                        .entry(self.name.clone())
                        .or_insert_with(|| default.clone());
                }
            }
        }
    }
}

/// The configuration tree every spatial interface needs.
pub fn minimal_config() -> ConfigNode {
    let vars = ConfigVariables::default();
    ConfigNode::element(
        "",
        vec![ConfigNode::element(
            "sensor",
            vec![
                ConfigNode::parameter("id", toml::Value::Integer(vars.sensor_id as i64)),
                ConfigNode::parameter("serial", toml::Value::String(vars.serial_name)),
                ConfigNode::parameter("frame", toml::Value::String(vars.coordinate_frame)),
                ConfigNode::parameter(
                    "update_rate_ms",
                    toml::Value::Integer(vars.update_rate_ms as i64),
                ),
                ConfigNode::parameter("publish", toml::Value::Boolean(vars.publish_enabled)),
            ],
        )],
    )
}

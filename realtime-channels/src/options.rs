//! Channel options: validation and normalization.
//!
//! Options arrive either typed (built with [`ChannelOptions`] builders) or
//! untyped from JSON via `ChannelOptions::try_from(serde_json::Value)`. Both
//! paths end in [`ChannelOptions::normalize`], which produces the form that is
//! compared for reattach decisions and sent with ATTACH.

use std::collections::BTreeMap;

use realtime_protocol::{ChannelMode, ErrorInfo};
use serde_json::Value;

/// Param keys the server understands. Others are dropped during normalization.
pub const RECOGNIZED_PARAMS: [&str; 4] = ["delta", "rewind", "occupancy", "modes"];

/// Param key whose value overrides the requested modes.
pub const MODES_PARAM: &str = "modes";

/// Options requested by the application for a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    pub params: Option<BTreeMap<String, String>>,
    pub modes: Option<Vec<ChannelMode>>,
}

impl ChannelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a param
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Builder method to request modes
    pub fn with_modes(mut self, modes: impl IntoIterator<Item = ChannelMode>) -> Self {
        self.modes = Some(modes.into_iter().collect());
        self
    }

    /// Whether these options carry anything the server negotiates.
    pub fn has_server_fields(&self) -> bool {
        self.params.is_some() || self.modes.is_some()
    }

    /// Validate and normalize these options.
    ///
    /// Unrecognized params are dropped, and `params.modes` is parsed so it can
    /// replace `modes` in the ATTACH request.
    pub fn normalize(&self) -> Result<NormalizedOptions, ErrorInfo> {
        let params = self.params.as_ref().map(|params| {
            params
                .iter()
                .filter(|(key, _)| RECOGNIZED_PARAMS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<BTreeMap<_, _>>()
        });

        let mode_override = match params.as_ref().and_then(|p| p.get(MODES_PARAM)) {
            Some(list) => Some(ChannelMode::parse_list(list).map_err(|e| {
                ErrorInfo::invalid_options(format!("Invalid params.modes: {e}"))
            })?),
            None => None,
        };

        Ok(NormalizedOptions {
            params,
            modes: self.modes.clone(),
            mode_override,
        })
    }
}

/// Options in the form compared for reattach decisions and sent with ATTACH.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedOptions {
    /// Recognized params only
    pub params: Option<BTreeMap<String, String>>,
    /// Modes as requested
    pub modes: Option<Vec<ChannelMode>>,
    /// Parsed `params.modes`
    pub mode_override: Option<Vec<ChannelMode>>,
}

impl NormalizedOptions {
    /// Modes to put on the ATTACH request: `params.modes` wins over `modes`.
    pub fn request_modes(&self) -> Option<&[ChannelMode]> {
        self.mode_override
            .as_deref()
            .or(self.modes.as_deref())
    }
}

impl TryFrom<Value> for ChannelOptions {
    type Error = ErrorInfo;

    /// Validate untyped options. `null` means no options.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut object = match value {
            Value::Null => return Ok(ChannelOptions::default()),
            Value::Object(object) => object,
            other => {
                return Err(ErrorInfo::invalid_options(format!(
                    "Channel options must be an object, got {}",
                    type_name(&other)
                )))
            }
        };

        let modes = match object.remove("modes") {
            Some(value) => Some(parse_modes(value)?),
            None => None,
        };

        let params = match object.remove("params") {
            Some(value) => Some(parse_params(value)?),
            None => None,
        };

        Ok(ChannelOptions { params, modes })
    }
}

fn parse_modes(value: Value) -> Result<Vec<ChannelMode>, ErrorInfo> {
    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            return Err(ErrorInfo::invalid_options(format!(
                "Channel options modes must be an array, got {}",
                type_name(&other)
            )))
        }
    };

    entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(name) => name
                .parse::<ChannelMode>()
                .map_err(|e| ErrorInfo::invalid_options(e.to_string())),
            other => Err(ErrorInfo::invalid_options(format!(
                "Channel mode must be a string, got {}",
                type_name(&other)
            ))),
        })
        .collect()
}

fn parse_params(value: Value) -> Result<BTreeMap<String, String>, ErrorInfo> {
    let entries = match value {
        Value::Object(entries) => entries,
        other => {
            return Err(ErrorInfo::invalid_options(format!(
                "Channel options params must be an object, got {}",
                type_name(&other)
            )))
        }
    };

    entries
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(ErrorInfo::invalid_options(format!(
                        "Channel param {key:?} must be a string, number or boolean, got {}",
                        type_name(&other)
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Serde representations for the OpenXR value types used in config files.
//! Enumerants are written as lower snake case names, versions as
//! `major.minor.patch` strings and usage flags as a list of flag names.

use crate::vr::{
    FormFactor, ReferenceSpaceType, SwapchainUsageFlags, Version, ViewConfigurationType,
};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const FORM_FACTORS: &[(&str, FormFactor)] = &[
    ("head_mounted_display", FormFactor::HEAD_MOUNTED_DISPLAY),
    ("handheld_display", FormFactor::HANDHELD_DISPLAY),
];

const VIEW_CONFIGURATIONS: &[(&str, ViewConfigurationType)] = &[
    ("primary_mono", ViewConfigurationType::PRIMARY_MONO),
    ("primary_stereo", ViewConfigurationType::PRIMARY_STEREO),
];

const REFERENCE_SPACES: &[(&str, ReferenceSpaceType)] = &[
    ("view", ReferenceSpaceType::VIEW),
    ("local", ReferenceSpaceType::LOCAL),
    ("stage", ReferenceSpaceType::STAGE),
];

const USAGE_FLAGS: &[(&str, SwapchainUsageFlags)] = &[
    ("color_attachment", SwapchainUsageFlags::COLOR_ATTACHMENT),
    ("depth_stencil_attachment", SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT),
    ("unordered_access", SwapchainUsageFlags::UNORDERED_ACCESS),
    ("transfer_src", SwapchainUsageFlags::TRANSFER_SRC),
    ("transfer_dst", SwapchainUsageFlags::TRANSFER_DST),
    ("sampled", SwapchainUsageFlags::SAMPLED),
    ("mutable_format", SwapchainUsageFlags::MUTABLE_FORMAT),
    ("input_attachment", SwapchainUsageFlags::INPUT_ATTACHMENT),
];

fn name_of<T: PartialEq>(table: &[(&'static str, T)], value: &T) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, candidate)| candidate == value)
        .map(|(name, _)| *name)
}

fn value_of<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, value)| *value)
}

fn expected_names<T>(table: &[(&str, T)]) -> String {
    table
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn serialize_named<T, S>(
    table: &[(&'static str, T)],
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    T: PartialEq + fmt::Debug,
    S: Serializer,
{
    match name_of(table, value) {
        Some(name) => serializer.serialize_str(name),
        None => Err(S::Error::custom(format!("{value:?} has no config name"))),
    }
}

fn deserialize_named<'de, T, D>(
    table: &[(&str, T)],
    label: &str,
    deserializer: D,
) -> Result<T, D::Error>
where
    T: Copy,
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    value_of(table, &name).ok_or_else(|| {
        D::Error::custom(format!(
            "unknown {label} '{name}', expected one of: {}",
            expected_names(table)
        ))
    })
}

macro_rules! named_enum {
    ($module:ident, $ty:ty, $table:ident, $label:literal) => {
        pub(crate) mod $module {
            use super::*;

            pub(crate) fn serialize<S: Serializer>(
                value: &$ty,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serialize_named($table, value, serializer)
            }

            pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<$ty, D::Error> {
                deserialize_named($table, $label, deserializer)
            }
        }
    };
}

named_enum!(form_factor, FormFactor, FORM_FACTORS, "form factor");
named_enum!(
    view_configuration,
    ViewConfigurationType,
    VIEW_CONFIGURATIONS,
    "view configuration"
);
named_enum!(reference_space, ReferenceSpaceType, REFERENCE_SPACES, "reference space");

/// Parses `major[.minor[.patch]]`; missing components are zero.
pub(crate) fn parse_version(text: &str) -> Result<Version, String> {
    let mut parts = text.trim().split('.');
    let mut component = |label: &str| -> Result<Option<u64>, String> {
        parts
            .next()
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|err| format!("invalid {label} version in '{text}': {err}"))
            })
            .transpose()
    };

    let major = component("major")?.ok_or_else(|| format!("empty version string '{text}'"))?;
    let minor = component("minor")?.unwrap_or(0);
    let patch = component("patch")?.unwrap_or(0);
    if parts.next().is_some() {
        return Err(format!("too many version components in '{text}'"));
    }

    let out_of_range = |label: &str| format!("{label} version out of range in '{text}'");
    let major = u16::try_from(major).map_err(|_| out_of_range("major"))?;
    let minor = u16::try_from(minor).map_err(|_| out_of_range("minor"))?;
    let patch = u32::try_from(patch).map_err(|_| out_of_range("patch"))?;
    Ok(Version::new(major, minor, patch))
}

pub(crate) mod version {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        value: &Version,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Version, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_version(&text).map_err(D::Error::custom)
    }
}

pub(crate) mod usage {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        value: &SwapchainUsageFlags,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let named: Vec<(&str, SwapchainUsageFlags)> = USAGE_FLAGS
            .iter()
            .copied()
            .filter(|(_, flag)| value.contains(*flag))
            .collect();
        let covered = named
            .iter()
            .fold(SwapchainUsageFlags::EMPTY, |acc, (_, flag)| acc | *flag);
        if covered != *value {
            return Err(S::Error::custom(format!(
                "usage flags {:#x} include bits without a config name",
                value.into_raw()
            )));
        }
        let names: Vec<&str> = named.into_iter().map(|(name, _)| name).collect();
        names.serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<SwapchainUsageFlags, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names.iter().try_fold(SwapchainUsageFlags::EMPTY, |acc, name| {
            value_of(USAGE_FLAGS, name).map(|flag| acc | flag).ok_or_else(|| {
                D::Error::custom(format!(
                    "unknown swapchain usage '{name}', expected any of: {}",
                    expected_names(USAGE_FLAGS)
                ))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn version_parses_partial_strings() {
        assert_eq!(parse_version("3"), Ok(Version::new(3, 0, 0)));
        assert_eq!(parse_version("1.0"), Ok(Version::new(1, 0, 0)));
        assert_eq!(parse_version("1.0.34"), Ok(Version::new(1, 0, 34)));
        assert!(parse_version("1.0.0.1").is_err());
        assert!(parse_version("").is_err());
        assert!(parse_version("70000.0").is_err());
    }

    #[test]
    fn unknown_names_list_the_accepted_ones() {
        let err = reference_space::deserialize(serde_json::Value::String("floor".into()))
            .unwrap_err();
        assert!(err.to_string().contains("view, local, stage"));
    }

    #[test]
    fn usage_flags_round_trip_through_names() {
        let flags = SwapchainUsageFlags::COLOR_ATTACHMENT | SwapchainUsageFlags::SAMPLED;
        let json = usage::serialize(&flags, serde_json::value::Serializer).unwrap();
        assert_eq!(json, serde_json::json!(["color_attachment", "sampled"]));
        assert_eq!(usage::deserialize(json).unwrap(), flags);
    }

    proptest! {
        #[test]
        fn version_text_round_trips(
            major in any::<u16>(),
            minor in any::<u16>(),
            patch in any::<u32>(),
        ) {
            let version = Version::new(major, minor, patch);
            prop_assert_eq!(parse_version(&version.to_string()), Ok(version));
        }
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::borrow::Cow;

use serde::Serialize;

use super::{ControlKind, ControlType, ControlValue};

/// Numeric id, name and value kind of a control.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlId {
    id: u32,
    name: Cow<'static, str>,
    kind: ControlKind,
}

impl ControlId {
    pub fn new(id: u32, name: impl Into<Cow<'static, str>>, kind: ControlKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn static_name(&self) -> Option<&'static str> {
        match self.name {
            Cow::Borrowed(name) => Some(name),
            Cow::Owned(_) => None,
        }
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn control_type(&self) -> ControlType {
        self.kind.control_type
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for ControlId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Limits of a control: minimum, maximum, default and optional enumerated
/// values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlInfo {
    pub min: ControlValue,
    pub max: ControlValue,
    pub def: ControlValue,
    pub values: Vec<ControlValue>,
}

impl ControlInfo {
    pub fn new(min: ControlValue, max: ControlValue, def: ControlValue) -> Self {
        Self {
            min,
            max,
            def,
            values: Vec::new(),
        }
    }

    /// Info for a control restricted to an enumerated set. The bounds are the
    /// first and last entries, as libcamera does.
    pub fn from_values(values: Vec<ControlValue>, def: ControlValue) -> Self {
        Self {
            min: values.first().cloned().unwrap_or_default(),
            max: values.last().cloned().unwrap_or_default(),
            def,
            values,
        }
    }

    pub fn min(&self) -> &ControlValue {
        &self.min
    }

    pub fn max(&self) -> &ControlValue {
        &self.max
    }

    pub fn def(&self) -> &ControlValue {
        &self.def
    }

    pub fn values(&self) -> &[ControlValue] {
        &self.values
    }
}

impl fmt::Display for ControlInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.min, self.max)
    }
}

/// Controls supported by a camera with their limits, ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlInfoMap {
    entries: Vec<(ControlId, ControlInfo)>,
}

impl ControlInfoMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the info for `id`, keeping entries sorted.
    pub fn insert(&mut self, id: ControlId, info: ControlInfo) {
        match self.entries.binary_search_by_key(&id.id(), |(k, _)| k.id()) {
            Ok(pos) => self.entries[pos] = (id, info),
            Err(pos) => self.entries.insert(pos, (id, info)),
        }
    }

    pub fn get(&self, id: u32) -> Option<&ControlInfo> {
        self.entries
            .binary_search_by_key(&id, |(k, _)| k.id())
            .ok()
            .map(|pos| &self.entries[pos].1)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    /// Looks up a control by its libcamera name, e.g. `"ExposureTime"`.
    pub fn find(&self, name: &str) -> Option<(&ControlId, &ControlInfo)> {
        self.entries
            .iter()
            .find(|(k, _)| k.name() == name)
            .map(|(k, v)| (k, v))
    }

    pub fn entries(&self) -> &[(ControlId, ControlInfo)] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ControlId, &ControlInfo)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(ControlId, ControlInfo)> for ControlInfoMap {
    fn from_iter<I: IntoIterator<Item = (ControlId, ControlInfo)>>(iter: I) -> Self {
        let mut map = ControlInfoMap::new();
        for (id, info) in iter {
            map.insert(id, info);
        }
        map
    }
}

impl Serialize for ControlInfoMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{controls, properties};

    #[test]
    fn map_is_ordered_by_id() {
        let map: ControlInfoMap = [
            (
                controls::EXPOSURE_TIME.control_id(),
                ControlInfo::new(100i32.into(), 66666i32.into(), 20000i32.into()),
            ),
            (
                controls::AE_ENABLE.control_id(),
                ControlInfo::new(false.into(), true.into(), true.into()),
            ),
        ]
        .into_iter()
        .collect();

        let ids: Vec<_> = map.iter().map(|(k, _)| k.id()).collect();
        assert_eq!(ids, vec![controls::AE_ENABLE.id(), controls::EXPOSURE_TIME.id()]);
        assert_eq!(
            map.get(controls::EXPOSURE_TIME.id()).unwrap().to_string(),
            "[100..66666]"
        );
        assert_eq!(map.find("AeEnable").unwrap().1.def(), &ControlValue::from(true));
        assert!(!map.contains(properties::MODEL.id() + 1000));
    }

    #[test]
    fn enumerated_values_set_bounds() {
        let info = ControlInfo::from_values(
            vec![0i32.into(), 1i32.into(), 2i32.into()],
            1i32.into(),
        );
        assert_eq!(info.to_string(), "[0..2]");
        assert_eq!(info.values().len(), 3);
    }
}

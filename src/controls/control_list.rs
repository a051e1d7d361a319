// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::collections::{btree_map, BTreeMap};

use serde::{Deserialize, Serialize};

use super::{ids, Control, ControlValue, ControlValueType};
use crate::error::Result;

/// Which id namespace a list's names are resolved in when printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdNamespace {
    #[default]
    Controls,
    Properties,
}

/// Ordered id → value container, a copy of a libcamera `ControlList`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlList {
    values: BTreeMap<u32, ControlValue>,
    #[serde(skip)]
    namespace: IdNamespace,
}

impl ControlList {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty list whose ids are camera properties.
    pub fn properties() -> Self {
        Self {
            values: BTreeMap::new(),
            namespace: IdNamespace::Properties,
        }
    }

    pub fn namespace(&self) -> IdNamespace {
        self.namespace
    }

    pub fn get(&self, id: u32) -> Option<&ControlValue> {
        self.values.get(&id)
    }

    pub fn set(&mut self, id: u32, value: impl Into<ControlValue>) {
        self.values.insert(id, value.into());
    }

    pub fn contains(&self, id: u32) -> bool {
        self.values.contains_key(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<ControlValue> {
        self.values.remove(&id)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in ascending id order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &ControlValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Reads a typed control. `Ok(None)` if absent.
    pub fn get_control<T: ControlValueType>(&self, control: Control<T>) -> Result<Option<T>> {
        self.values
            .get(&control.id())
            .map(|v| v.get::<T>())
            .transpose()
    }

    pub fn set_control<T: ControlValueType>(&mut self, control: Control<T>, value: T) {
        self.values.insert(control.id(), value.into_value());
    }

    /// Copies entries from `other` whose ids are not already present.
    pub fn merge(&mut self, other: &ControlList) {
        for (id, value) in &other.values {
            self.values
                .entry(*id)
                .or_insert_with(|| value.clone());
        }
    }

    /// Copies every entry from `other`, overwriting existing ids.
    pub fn update(&mut self, other: &ControlList) {
        for (id, value) in &other.values {
            self.values.insert(*id, value.clone());
        }
    }

    fn name_of(&self, id: u32) -> Option<&'static str> {
        match self.namespace {
            IdNamespace::Controls => ids::control_name(id),
            IdNamespace::Properties => ids::property_name(id),
        }
    }
}

impl FromIterator<(u32, ControlValue)> for ControlList {
    fn from_iter<I: IntoIterator<Item = (u32, ControlValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            namespace: IdNamespace::Controls,
        }
    }
}

impl Extend<(u32, ControlValue)> for ControlList {
    fn extend<I: IntoIterator<Item = (u32, ControlValue)>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

impl IntoIterator for ControlList {
    type Item = (u32, ControlValue);
    type IntoIter = btree_map::IntoIter<u32, ControlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Debug for ControlList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ControlList");
        for (id, value) in &self.values {
            let label = match self.name_of(*id) {
                Some(name) => name.to_owned(),
                None => format!("Unknown({id})"),
            };
            s.field(&label, &format_args!("{value}"));
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{controls, properties, ControlType};

    #[test]
    fn typed_round_trip() {
        let mut list = ControlList::new();
        list.set_control(controls::EXPOSURE_TIME, 10000);
        list.set_control(controls::COLOUR_GAINS, [1.5, 2.0]);
        assert_eq!(list.get_control(controls::EXPOSURE_TIME).unwrap(), Some(10000));
        assert_eq!(
            list.get_control(controls::COLOUR_GAINS).unwrap(),
            Some([1.5, 2.0])
        );
        assert_eq!(list.get_control(controls::AE_ENABLE).unwrap(), None);

        list.set(controls::AE_ENABLE.id(), 3i32);
        assert!(list.get_control(controls::AE_ENABLE).is_err());
    }

    #[test]
    fn copies_keep_kinds_and_order() {
        let mut list = ControlList::new();
        list.set(9, vec![0.25f32, 0.5, 0.75]);
        list.set(3, 42i32);

        let mut copy = ControlList::new();
        for (id, value) in list.entries() {
            copy.set(id, value.clone());
        }
        assert_eq!(copy, list);

        let kinds: Vec<_> = copy
            .entries()
            .map(|(id, v)| (id, v.control_type(), v.is_array(), v.num_elements()))
            .collect();
        assert_eq!(
            kinds,
            [(3, ControlType::Int32, false, 1), (9, ControlType::Float, true, 3)]
        );
        assert_eq!(
            copy.get(9).map(ToString::to_string).as_deref(),
            Some("[ 0.250000, 0.500000, 0.750000 ]")
        );
    }

    #[test]
    fn merge_keeps_existing() {
        let mut a = ControlList::new();
        a.set(1, true);
        let mut b = ControlList::new();
        b.set(1, false);
        b.set(7, 500i32);

        a.merge(&b);
        assert_eq!(a.get(1), Some(&ControlValue::from(true)));
        assert_eq!(a.get(7), Some(&ControlValue::from(500i32)));

        a.update(&b);
        assert_eq!(a.get(1), Some(&ControlValue::from(false)));
    }

    #[test]
    fn debug_uses_names() {
        let mut list = ControlList::properties();
        list.set_control(properties::MODEL, "imx708".to_owned());
        list.set(4242, 1i32);
        let text = format!("{list:?}");
        assert!(text.contains("Model: imx708"), "{text}");
        assert!(text.contains("Unknown(4242): 1"), "{text}");
    }
}

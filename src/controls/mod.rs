// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Control values, lists and limits copied out of libcamera.
//!
//! Everything here is a plain value: reading a control list from a request
//! or a camera produces an owned [`ControlList`], and writing one back copies
//! it into the native list.

mod control_info;
mod control_list;
mod control_value;
pub mod ids;

pub use control_info::{ControlId, ControlInfo, ControlInfoMap};
pub use control_list::{ControlList, IdNamespace};
pub use control_value::{
    ControlArray, ControlElement, ControlKind, ControlScalar, ControlType, ControlValue,
    ControlValueType,
};
pub use ids::{control_name, controls, controls::*, properties, property_name, Control};

/*
 * extensions.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP client transport.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Request/response extension map: loosely typed values that tracing hooks and the protocol
//! layer attach to an exchange.

use bytes::Bytes;
use std::collections::HashMap;

/// Extension map carried by requests and responses.
pub type Extensions = HashMap<String, ExtensionValue>;

/// Key under which the protocol layer records the response's HTTP version.
pub const HTTP_VERSION: &str = "http_version";

#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionValue {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Bytes(Bytes),
    Dict(HashMap<String, ExtensionValue>),
    List(Vec<ExtensionValue>),
}

impl ExtensionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExtensionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ExtensionValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ExtensionValue::I64(n) => Some(n),
            ExtensionValue::U64(n) => i64::try_from(n).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ExtensionValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for ExtensionValue {
    fn from(s: &str) -> Self {
        ExtensionValue::Str(s.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(s: String) -> Self {
        ExtensionValue::Str(s)
    }
}

impl From<i64> for ExtensionValue {
    fn from(n: i64) -> Self {
        ExtensionValue::I64(n)
    }
}

impl From<u64> for ExtensionValue {
    fn from(n: u64) -> Self {
        ExtensionValue::U64(n)
    }
}

impl From<f64> for ExtensionValue {
    fn from(n: f64) -> Self {
        ExtensionValue::F64(n)
    }
}

impl From<bool> for ExtensionValue {
    fn from(b: bool) -> Self {
        ExtensionValue::Bool(b)
    }
}

impl From<Bytes> for ExtensionValue {
    fn from(b: Bytes) -> Self {
        ExtensionValue::Bytes(b)
    }
}

impl From<&'static [u8]> for ExtensionValue {
    fn from(b: &'static [u8]) -> Self {
        ExtensionValue::Bytes(Bytes::from_static(b))
    }
}

impl From<Vec<ExtensionValue>> for ExtensionValue {
    fn from(items: Vec<ExtensionValue>) -> Self {
        ExtensionValue::List(items)
    }
}

impl From<HashMap<String, ExtensionValue>> for ExtensionValue {
    fn from(map: HashMap<String, ExtensionValue>) -> Self {
        ExtensionValue::Dict(map)
    }
}

/// Response extensions: the protocol's entries, overlaid with the request's.
pub(crate) fn merge(protocol: Extensions, request: Extensions) -> Extensions {
    let mut merged = protocol;
    merged.extend(request);
    merged
}

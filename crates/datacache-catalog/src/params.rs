// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl ParamValue {
    fn values(&self) -> Vec<&str> {
        match self {
            Self::One(v) => vec![v.as_str()],
            Self::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// Query parameters of a catalog client.
///
/// A map whose values are lists stands for the Cartesian product of those
/// lists; a list of maps is the concatenation of each map's product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParameters {
    Single(BTreeMap<String, ParamValue>),
    Sets(Vec<BTreeMap<String, ParamValue>>),
}

impl Default for QueryParameters {
    fn default() -> Self {
        Self::Single(BTreeMap::new())
    }
}

impl QueryParameters {
    /// One parameter list per HTTP call, in a stable order: sets in
    /// declaration order, keys ascending, values in declaration order with
    /// the last key varying fastest.
    #[must_use]
    pub fn expand(&self) -> Vec<Vec<(String, String)>> {
        match self {
            Self::Single(map) => expand_map(map),
            Self::Sets(maps) => maps.iter().flat_map(expand_map).collect(),
        }
    }
}

fn expand_map(map: &BTreeMap<String, ParamValue>) -> Vec<Vec<(String, String)>> {
    let mut combos: Vec<Vec<(String, String)>> = vec![Vec::new()];
    for (key, value) in map {
        let values = value.values();
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for v in &values {
                let mut extended = combo.clone();
                extended.push((key.clone(), (*v).to_string()));
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

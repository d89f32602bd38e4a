// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! JSON wire format of the affinity matrix.
//!
//! ```text
//! {"cpu:0":[["erdma_0"],["erdma_1"]],"cpu:1":[["erdma_1"],["erdma_0"]]}
//! ```
//!
//! Every value is a two element array `[preferred, avail]` of device names.
//! Keys and names keep their order in both directions.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeTuple};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, error};

use crate::errors::{TopologyError, TopologyResult};
use crate::matrix::{AffinityEntry, AffinityMatrix, Topology};

impl Serialize for AffinityEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pair = serializer.serialize_tuple(2)?;
        pair.serialize_element(&self.preferred)?;
        pair.serialize_element(&self.avail)?;
        pair.end()
    }
}

struct EntryVisitor;

impl<'de> Visitor<'de> for EntryVisitor {
    type Value = AffinityEntry;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a [preferred, avail] pair of device name arrays")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let preferred: Vec<String> = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let avail: Vec<String> = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let mut len = 2;
        while seq.next_element::<IgnoredAny>()?.is_some() {
            len += 1;
        }
        if len != 2 {
            return Err(de::Error::invalid_length(len, &self));
        }
        Ok(AffinityEntry { preferred, avail })
    }
}

impl<'de> Deserialize<'de> for AffinityEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(EntryVisitor)
    }
}

/// Borrowed matrix, serialized as a JSON object in matrix order.
struct WireOut<'a>(&'a AffinityMatrix);

impl Serialize for WireOut<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, entry) in self.0 {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}

/// Owned matrix, deserialized from a JSON object in document order.
struct WireIn(AffinityMatrix);

struct MatrixVisitor;

impl<'de> Visitor<'de> for MatrixVisitor {
    type Value = WireIn;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping locality keys to [preferred, avail] pairs")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut matrix = AffinityMatrix::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, entry)) = access.next_entry::<String, AffinityEntry>()? {
            // a repeated key overwrites the value in place
            if let Some(_previous) = matrix.insert(key, entry) {
                debug!("duplicate locality key in topology: last value wins");
            }
        }
        Ok(WireIn(matrix))
    }
}

impl<'de> Deserialize<'de> for WireIn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MatrixVisitor)
    }
}

impl Topology {
    /// Replace the matrix with the one described by `json`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::MalformedJson`] if `json` is not valid JSON or does not have the
    /// shape of an affinity matrix.
    /// The topology is left empty in that case.
    pub fn parse(&mut self, json: &str) -> TopologyResult {
        match serde_json::from_str::<WireIn>(json) {
            Ok(WireIn(matrix)) => {
                debug!("parsed topology with {} entries", matrix.len());
                self.replace(matrix);
                Ok(())
            }
            Err(e) => {
                error!("rejecting topology: {e}");
                self.clear();
                Err(TopologyError::MalformedJson(e))
            }
        }
    }

    /// Build a topology from its JSON form.
    ///
    /// # Errors
    ///
    /// Same as [`Topology::parse`].
    pub fn from_json(json: &str) -> Result<Self, TopologyError> {
        let mut topology = Topology::new();
        topology.parse(json)?;
        Ok(topology)
    }

    /// Compact JSON form of the matrix, accepted back by [`Topology::parse`].
    #[must_use]
    pub fn to_json(&self) -> String {
        // string keys and string arrays always serialize
        serde_json::to_string(&WireOut(&self.matrix)).unwrap_or_else(|_| unreachable!())
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

impl FromStr for Topology {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topology::from_json(s)
    }
}

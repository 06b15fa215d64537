use std::sync::Arc;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use quarry_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use super::function::AggregateExpr;
use super::state::AggregateState;
use crate::arrays::key::Key;
use crate::arrays::record::Record;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::schema::Schema;
use crate::expr::register::RowBinding;

/// Group by keys and the aggregates computed per group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingDefinition {
    keys: Key,
    aggregates: Vec<AggregateExpr>,
}

impl GroupingDefinition {
    pub fn new(keys: Key, aggregates: impl IntoIterator<Item = AggregateExpr>) -> Self {
        GroupingDefinition {
            keys,
            aggregates: aggregates.into_iter().collect(),
        }
    }

    pub fn keys(&self) -> &Key {
        &self.keys
    }

    pub fn aggregates(&self) -> &[AggregateExpr] {
        &self.aggregates
    }

    /// Arity of rendered group records, key columns followed by one column
    /// per aggregate.
    pub fn output_arity(&self) -> usize {
        self.keys.arity() + self.aggregates.len()
    }

    pub fn validate(&self, input: &Schema) -> Result<()> {
        self.keys.validate(input.arity())
    }

    pub fn new_states(&self) -> Vec<AggregateState> {
        self.aggregates.iter().map(|agg| agg.new_state()).collect()
    }
}

/// A group and its aggregate states, the unit written to spill files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub key: Vec<ScalarValue>,
    pub states: Vec<AggregateState>,
}

impl GroupRow {
    /// Key values followed by finalized aggregate values.
    pub fn render(&self) -> Record {
        Record::new(
            self.key
                .iter()
                .cloned()
                .chain(self.states.iter().map(|s| s.finalize())),
        )
    }
}

/// Merge `other` states into `states`, erroring if the aggregate counts
/// differ.
pub(crate) fn merge_states(states: &mut [AggregateState], other: &[AggregateState]) -> Result<()> {
    if states.len() != other.len() {
        return Err(DbError::new("Mismatched aggregate state counts")
            .with_field("left", states.len())
            .with_field("right", other.len()));
    }
    for (state, other) in states.iter_mut().zip(other) {
        state.merge(other)?;
    }
    Ok(())
}

/// In-memory grouping table holding at most `capacity` groups.
#[derive(Debug)]
pub struct GroupingTable {
    definition: Arc<GroupingDefinition>,
    capacity: usize,
    groups: HashMap<Vec<ScalarValue>, Vec<AggregateState>>,
    binding: RowBinding,
}

impl GroupingTable {
    pub fn new(definition: Arc<GroupingDefinition>, capacity: usize) -> Self {
        GroupingTable {
            definition,
            capacity,
            groups: HashMap::new(),
            binding: RowBinding::new(),
        }
    }

    /// Empty table sharing this table's definition and capacity.
    pub fn new_empty(&self) -> Self {
        Self::new(self.definition.clone(), self.capacity)
    }

    pub fn definition(&self) -> &Arc<GroupingDefinition> {
        &self.definition
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.groups.len() >= self.capacity
    }

    pub fn contains_key(&self, key: &[ScalarValue]) -> bool {
        self.groups.contains_key(key)
    }

    /// Add a row to its group, creating the group if needed.
    pub fn insert(&mut self, record: &Record) -> Result<()> {
        let key = record.key_values(&self.definition.keys);
        self.binding.assign_left(record.clone());

        let states = match self.groups.entry(key) {
            Entry::Occupied(ent) => ent.into_mut(),
            Entry::Vacant(ent) => ent.insert(self.definition.new_states()),
        };

        for (state, agg) in states.iter_mut().zip(&self.definition.aggregates) {
            let inputs = agg.evaluate_inputs(&self.binding)?;
            state.update(&inputs)?;
        }

        Ok(())
    }

    /// Merge a group's states into the table.
    pub fn merge_row(&mut self, row: GroupRow) -> Result<()> {
        match self.groups.entry(row.key) {
            Entry::Occupied(mut ent) => merge_states(ent.get_mut(), &row.states),
            Entry::Vacant(ent) => {
                ent.insert(row.states);
                Ok(())
            }
        }
    }

    /// Merge every group from another table into this one.
    pub fn absorb(&mut self, other: GroupingTable) -> Result<()> {
        for row in other.into_rows() {
            self.merge_row(row)?;
        }
        Ok(())
    }

    /// Number of groups in `other` that aren't in this table.
    pub fn count_new_groups(&self, other: &GroupingTable) -> usize {
        other
            .groups
            .keys()
            .filter(|key| !self.groups.contains_key(*key))
            .count()
    }

    pub fn remove(&mut self, key: &[ScalarValue]) -> Option<Vec<AggregateState>> {
        self.groups.remove(key)
    }

    /// Take every group out of the table, ordered by key.
    pub fn take_rows(&mut self) -> Vec<GroupRow> {
        let mut rows: Vec<_> = self
            .groups
            .drain()
            .map(|(key, states)| GroupRow { key, states })
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        rows
    }

    pub fn into_rows(mut self) -> Vec<GroupRow> {
        self.take_rows()
    }

    /// Groups ordered by key without emptying the table.
    pub fn rows(&self) -> Vec<GroupRow> {
        let mut rows: Vec<_> = self
            .groups
            .iter()
            .map(|(key, states)| GroupRow {
                key: key.clone(),
                states: states.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        rows
    }
}

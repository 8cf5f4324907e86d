//! Grouping of records by relation keys.
//!
//! A [`PortDefinition`] holds the records that arrived on one input port and
//! indexes them under any number of relations. Each relation maps a
//! [`HashKey`] to the [`TreeRecord`] listing every record with that key, so a
//! parent record can find all of its children in one lookup.

use super::{HashKey, RecordKey};
use crate::error::{Error, Result};
use crate::metadata::RecordMetadata;
use crate::record::DataRecord;
use std::collections::HashMap;
use std::sync::Arc;

/// All records sharing one key value, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct TreeRecord {
    records: Vec<Arc<DataRecord>>,
}

impl TreeRecord {
    /// Records in arrival order.
    pub fn records(&self) -> &[Arc<DataRecord>] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no record was added.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug)]
struct Relation {
    key: Arc<RecordKey>,
    groups: HashMap<HashKey, TreeRecord>,
}

/// Records of one input port with their relation indexes.
#[derive(Debug)]
pub struct PortDefinition {
    port: usize,
    metadata: Arc<RecordMetadata>,
    records: Vec<Arc<DataRecord>>,
    relations: HashMap<String, Relation>,
}

impl PortDefinition {
    /// Creates an empty definition for input `port`.
    pub fn new(port: usize, metadata: Arc<RecordMetadata>) -> Self {
        Self { port, metadata, records: Vec::new(), relations: HashMap::new() }
    }

    /// Input port number.
    pub fn port(&self) -> usize {
        self.port
    }

    /// Metadata of the port's records.
    pub fn metadata(&self) -> &Arc<RecordMetadata> {
        &self.metadata
    }

    /// Registers a relation over `fields` and returns its name.
    ///
    /// The name is the key definition string (for example `"a(a);b(a)"`).
    /// Records added earlier are indexed under the new relation too.
    pub fn add_relation(&mut self, fields: &[&str]) -> Result<String> {
        let key = Arc::new(RecordKey::new(fields, self.metadata.clone())?);
        let name = key.to_string();
        if !self.relations.contains_key(&name) {
            let mut relation = Relation { key, groups: HashMap::new() };
            for record in &self.records {
                Self::index(&mut relation, record.clone())?;
            }
            self.relations.insert(name.clone(), relation);
        }
        Ok(name)
    }

    /// Stores `record` and indexes it under every registered relation.
    ///
    /// Fails with [`Error::InvalidArgument`] if `record` is not laid out by
    /// the port's metadata.
    pub fn add_record(&mut self, record: Arc<DataRecord>) -> Result<()> {
        if !Arc::ptr_eq(record.metadata(), &self.metadata) && record.metadata().as_ref() != self.metadata.as_ref() {
            return Err(Error::invalid_argument(format!(
                "Port {} takes '{}' records, got '{}'",
                self.port,
                self.metadata.name(),
                record.metadata().name()
            )));
        }
        for relation in self.relations.values_mut() {
            Self::index(relation, record.clone())?;
        }
        self.records.push(record);
        Ok(())
    }

    fn index(relation: &mut Relation, record: Arc<DataRecord>) -> Result<()> {
        let hash_key = HashKey::new(relation.key.clone(), record.clone())?;
        relation.groups.entry(hash_key).or_default().records.push(record);
        Ok(())
    }

    /// Key of relation `name`.
    pub fn relation_key(&self, name: &str) -> Option<&Arc<RecordKey>> {
        self.relations.get(name).map(|r| &r.key)
    }

    /// Records of relation `name` whose key values equal those of `probe`.
    pub fn tree_record(&self, name: &str, probe: &HashKey) -> Option<&TreeRecord> {
        self.relations.get(name)?.groups.get(probe)
    }

    /// Number of distinct key values under relation `name`.
    pub fn num_groups(&self, name: &str) -> usize {
        self.relations.get(name).map_or(0, |r| r.groups.len())
    }

    /// Every record added, in arrival order.
    pub fn records(&self) -> &[Arc<DataRecord>] {
        &self.records
    }

    /// Drops all records; registered relations stay, empty.
    pub fn reset(&mut self) {
        self.records.clear();
        for relation in self.relations.values_mut() {
            relation.groups.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldType;
    use crate::record::Value;

    fn customers() -> Arc<RecordMetadata> {
        Arc::new(RecordMetadata::new("customer").with_field("id", FieldType::Integer))
    }

    fn orders() -> Arc<RecordMetadata> {
        Arc::new(
            RecordMetadata::new("order")
                .with_field("order_id", FieldType::Integer)
                .with_field("customer_id", FieldType::Integer),
        )
    }

    fn order(md: &Arc<RecordMetadata>, id: i32, customer: i32) -> Arc<DataRecord> {
        Arc::new(DataRecord::from_values(md.clone(), vec![Value::Integer(id), Value::Integer(customer)]).unwrap())
    }

    #[test]
    fn test_one_to_many() {
        let md = orders();
        let mut port = PortDefinition::new(1, md.clone());
        let relation = port.add_relation(&["customer_id"]).unwrap();
        for (id, customer) in [(1, 10), (2, 20), (3, 10), (4, 10)] {
            port.add_record(order(&md, id, customer)).unwrap();
        }
        assert_eq!(port.num_groups(&relation), 2);

        let customer_md = customers();
        let parent_key = Arc::new(RecordKey::new(&["id"], customer_md.clone()).unwrap());
        let parent = Arc::new(DataRecord::from_values(customer_md, vec![Value::Integer(10)]).unwrap());
        let children = port.tree_record(&relation, &HashKey::new(parent_key, parent).unwrap()).unwrap();
        let ids: Vec<_> = children.records().iter().map(|r| r.get(0).clone()).collect();
        assert_eq!(ids, vec![Value::Integer(1), Value::Integer(3), Value::Integer(4)]);
    }

    #[test]
    fn test_late_relation_indexes_existing_records() {
        let md = orders();
        let mut port = PortDefinition::new(0, md.clone());
        port.add_record(order(&md, 1, 5)).unwrap();
        port.add_record(order(&md, 2, 5)).unwrap();
        let relation = port.add_relation(&["customer_id"]).unwrap();
        assert_eq!(port.add_relation(&["customer_id"]).unwrap(), relation);

        let key = port.relation_key(&relation).unwrap().clone();
        let probe = HashKey::new(key, order(&md, 99, 5)).unwrap();
        assert_eq!(port.tree_record(&relation, &probe).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_relation_field() {
        let mut port = PortDefinition::new(0, orders());
        assert!(port.add_relation(&["nope"]).is_err());
    }

    #[test]
    fn test_rejects_foreign_records() {
        let md = orders();
        let mut port = PortDefinition::new(0, md.clone());
        let relation = port.add_relation(&["customer_id"]).unwrap();
        let customer = Arc::new(DataRecord::from_values(customers(), vec![Value::Integer(10)]).unwrap());
        assert!(matches!(port.add_record(customer), Err(Error::InvalidArgument(_))));
        assert!(port.records().is_empty());
        assert_eq!(port.num_groups(&relation), 0);
    }

    #[test]
    fn test_reset() {
        let md = orders();
        let mut port = PortDefinition::new(0, md.clone());
        let relation = port.add_relation(&["customer_id"]).unwrap();
        port.add_record(order(&md, 1, 5)).unwrap();
        port.reset();
        assert!(port.records().is_empty());
        assert_eq!(port.num_groups(&relation), 0);
        assert!(port.relation_key(&relation).is_some());
    }
}

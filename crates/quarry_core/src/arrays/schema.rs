use quarry_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use super::record::Record;
use super::scalar::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub datatype: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: DataType, nullable: bool) -> Self {
        Field {
            name: name.into(),
            datatype,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Find the index of a field by name.
    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| DbError::new(format!("Missing field '{name}'")))
    }

    /// Record of nulls matching this schema, used for outer join padding.
    pub fn null_record(&self) -> Record {
        Record::nulls(self.arity())
    }

    /// Schema for the concatenation of two records.
    pub fn merge(&self, other: &Schema) -> Schema {
        Schema {
            fields: self.fields.iter().chain(&other.fields).cloned().collect(),
        }
    }

    /// Check that a record is compatible with this schema.
    pub fn check_record(&self, record: &Record) -> Result<()> {
        if record.arity() != self.arity() {
            return Err(DbError::new("Record arity does not match schema")
                .with_field("record", record.arity())
                .with_field("schema", self.arity()));
        }

        for (field, value) in self.fields.iter().zip(record.values()) {
            if value.is_null() {
                if !field.nullable {
                    return Err(DbError::new(format!(
                        "Null value for non-nullable field '{}'",
                        field.name
                    )));
                }
                continue;
            }
            if value.datatype() != field.datatype {
                return Err(DbError::new(format!(
                    "Unexpected type for field '{}'",
                    field.name
                ))
                .with_field("expected", field.datatype)
                .with_field("got", value.datatype()));
            }
        }

        Ok(())
    }
}

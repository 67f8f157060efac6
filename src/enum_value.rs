use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnumError {
    #[error("The names list cannot be empty")]
    EmptyNames,

    #[error("The values and names lists must be the same length ({names} names, {values} values)")]
    LengthMismatch { names: usize, values: usize },

    #[error("State not recognized: {0}")]
    UnknownName(String),

    #[error("Value not recognized: {0}")]
    UnknownValue(i64),

    #[error("State is out of range: {0}")]
    StateOutOfRange(usize),
}

/// Names and optional integer values of an enumerated type.
///
/// Tables are shared read-only between every [`EnumValue`] derived from the
/// same prototype.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumTable {
    names: Vec<String>,
    values: Option<Vec<i64>>,
}

impl EnumTable {
    fn validate(&self) -> Result<(), EnumError> {
        if self.names.is_empty() {
            return Err(EnumError::EmptyNames);
        }
        if let Some(values) = &self.values {
            if values.len() != self.names.len() {
                return Err(EnumError::LengthMismatch {
                    names: self.names.len(),
                    values: values.len(),
                });
            }
        }
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> Option<&[i64]> {
        self.values.as_deref()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A C-style enumerated value: a closed set of named states with optional
/// integer values, and the index of the current state.
///
/// Cloning an `EnumValue` never copies the name/value table; the clone only
/// carries its own state index.
#[derive(Clone, PartialEq, Eq)]
pub struct EnumValue {
    table: Arc<EnumTable>,
    state: usize,
}

impl EnumValue {
    /// Build a new enumerated type from its state names and, optionally, the
    /// integer value of each state. Without explicit values, the value of a
    /// state is its index.
    pub fn new<S: Into<String>>(
        names: impl IntoIterator<Item = S>,
        values: Option<&[i64]>,
        state: usize,
    ) -> Result<Self, EnumError> {
        let table = EnumTable {
            names: names.into_iter().map(Into::into).collect(),
            values: values.map(<[i64]>::to_vec),
        };
        table.validate()?;
        if state >= table.len() {
            return Err(EnumError::StateOutOfRange(state));
        }
        Ok(Self {
            table: Arc::new(table),
            state,
        })
    }

    /// Tables compiled into the schema. Their shape is checked by the schema tests.
    pub(crate) fn builtin(names: &[&str], values: Option<&[i64]>, state: usize) -> Self {
        let table = EnumTable {
            names: names.iter().map(|name| (*name).to_string()).collect(),
            values: values.map(<[i64]>::to_vec),
        };
        debug_assert!(table.validate().is_ok());
        debug_assert!(state < table.len());
        Self {
            table: Arc::new(table),
            state,
        }
    }

    /// Re-check the table invariants.
    pub fn validate(&self) -> Result<(), EnumError> {
        self.table.validate()?;
        if self.state >= self.table.len() {
            return Err(EnumError::StateOutOfRange(self.state));
        }
        Ok(())
    }

    pub fn table(&self) -> &EnumTable {
        &self.table
    }

    /// True when both values read from the same underlying table.
    pub fn shares_table(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }

    /// Name of the current state
    pub fn get(&self) -> &str {
        &self.table.names[self.state]
    }

    /// Integer value of the current state
    pub fn get_value(&self) -> i64 {
        match &self.table.values {
            Some(values) => values[self.state],
            None => self.state as i64,
        }
    }

    pub fn get_state(&self) -> usize {
        self.state
    }

    /// Select the first state carrying `name`.
    pub fn set_name(&mut self, name: &str) -> Result<(), EnumError> {
        let state = self
            .table
            .names
            .iter()
            .position(|candidate| candidate == name)
            .ok_or_else(|| EnumError::UnknownName(name.to_string()))?;
        self.state = state;
        Ok(())
    }

    /// Select the first state whose value is `value`.
    pub fn set_value(&mut self, value: i64) -> Result<(), EnumError> {
        let state = match &self.table.values {
            Some(values) => values.iter().position(|candidate| *candidate == value),
            None => usize::try_from(value)
                .ok()
                .filter(|index| *index < self.table.len()),
        };
        self.state = state.ok_or(EnumError::UnknownValue(value))?;
        Ok(())
    }

    pub fn set_state(&mut self, state: usize) -> Result<(), EnumError> {
        if state >= self.table.len() {
            return Err(EnumError::StateOutOfRange(state));
        }
        self.state = state;
        Ok(())
    }

    /// Derive a new value from this prototype by interpreting `text` as an
    /// integer value when it parses as one, and as a state name otherwise.
    pub fn parse(&self, text: &str) -> Result<Self, EnumError> {
        let mut derived = self.clone();
        match text.trim().parse::<i64>() {
            Ok(value) => derived.set_value(value)?,
            Err(_) => derived.set_name(text)?,
        }
        Ok(derived)
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get())
    }
}

impl fmt::Debug for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, name) in self.table.names.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            let entry = match &self.table.values {
                Some(values) => format!("{}:{}", name, values[index]),
                None => name.clone(),
            };
            if index == self.state {
                write!(f, "({entry})")?;
            } else {
                f.write_str(&entry)?;
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> EnumValue {
        EnumValue::new(["any", "usb", "eth", "ethernet"], Some(&[0, 1, 3, 3]), 0).unwrap()
    }

    #[test]
    fn test_new_rejects_malformed_tables() {
        let empty: [&str; 0] = [];
        assert_eq!(
            EnumValue::new(empty, None, 0).unwrap_err(),
            EnumError::EmptyNames
        );
        assert_eq!(
            EnumValue::new(["a", "b"], Some(&[1]), 0).unwrap_err(),
            EnumError::LengthMismatch {
                names: 2,
                values: 1
            }
        );
        assert_eq!(
            EnumValue::new(["a", "b"], None, 2).unwrap_err(),
            EnumError::StateOutOfRange(2)
        );
    }

    #[test]
    fn test_set_by_name_and_value() {
        let mut value = connection();
        value.set_name("usb").unwrap();
        assert_eq!(value.get(), "usb");
        assert_eq!(value.get_value(), 1);

        // Duplicate values resolve to the first matching state
        value.set_value(3).unwrap();
        assert_eq!(value.get(), "eth");
        assert_eq!(value.get_state(), 2);

        assert_eq!(
            value.set_name("serial").unwrap_err(),
            EnumError::UnknownName("serial".to_string())
        );
        assert_eq!(value.set_value(2).unwrap_err(), EnumError::UnknownValue(2));
        // A failed set leaves the state alone
        assert_eq!(value.get(), "eth");
    }

    #[test]
    fn test_values_default_to_index() {
        let mut edge = EnumValue::new(["rising", "falling", "all"], None, 0).unwrap();
        assert_eq!(edge.get_value(), 0);
        edge.set_value(2).unwrap();
        assert_eq!(edge.get(), "all");
        assert!(edge.set_value(3).is_err());
        assert!(edge.set_value(-1).is_err());
    }

    #[test]
    fn test_parse_shares_table() {
        let prototype = connection();
        let derived = prototype.parse("ethernet").unwrap();
        assert_eq!(derived.get(), "ethernet");
        assert_eq!(prototype.get(), "any");
        assert!(derived.shares_table(&prototype));

        let by_value = prototype.parse("1").unwrap();
        assert_eq!(by_value.get(), "usb");
        assert!(prototype.parse("7").is_err());
    }

    #[test]
    fn test_debug_marks_current_state() {
        let value = connection().parse("usb").unwrap();
        assert_eq!(format!("{value:?}"), "{any:0, (usb:1), eth:3, ethernet:3}");
        assert_eq!(value.to_string(), "usb");

        let plain = EnumValue::new(["none", "uart"], None, 0).unwrap();
        assert_eq!(format!("{plain:?}"), "{(none), uart}");
    }
}

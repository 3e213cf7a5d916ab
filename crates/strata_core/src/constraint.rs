//! The declarative constraint language.
//!
//! A constraint tree is a list of groups; each group is a list of
//! `{name, comparator, value}` constraints. A row matches when any group
//! matches, and a group matches when all of its constraints match.

use crate::error::{CoreError, CoreResult};
use crate::schema::validate_name;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// Equal.
    #[serde(rename = "=")]
    Eq,
    /// Not equal.
    #[serde(rename = "!=")]
    Ne,
    /// Greater than.
    #[serde(rename = ">")]
    Gt,
    /// Greater than or equal.
    #[serde(rename = ">=")]
    Ge,
    /// Less than.
    #[serde(rename = "<")]
    Lt,
    /// Less than or equal.
    #[serde(rename = "<=")]
    Le,
    /// Member of a list.
    #[serde(rename = "in")]
    In,
    /// Not a member of a list.
    #[serde(rename = "not in")]
    NotIn,
    /// Contains a substring.
    #[serde(rename = "contains")]
    Contains,
    /// Does not contain a substring.
    #[serde(rename = "not contains")]
    NotContains,
    /// Contains at least one substring of a list.
    #[serde(rename = "contains in")]
    ContainsIn,
    /// Contains every substring of a list.
    #[serde(rename = "contains all")]
    ContainsAll,
    /// Contains none of the substrings of a list.
    #[serde(rename = "not contains in")]
    NotContainsIn,
    /// Starts with a prefix.
    #[serde(rename = "begins with")]
    BeginsWith,
    /// Does not start with a prefix.
    #[serde(rename = "not begins with")]
    NotBeginsWith,
    /// Ends with a suffix.
    #[serde(rename = "ends with")]
    EndsWith,
    /// Does not end with a suffix.
    #[serde(rename = "not ends with")]
    NotEndsWith,
    /// Matches a regular expression.
    #[serde(rename = "regex")]
    Regex,
    /// Does not match a regular expression.
    #[serde(rename = "not regex")]
    NotRegex,
    /// Equals the column's empty value.
    #[serde(rename = "empty")]
    Empty,
    /// Differs from the column's empty value.
    #[serde(rename = "not_empty")]
    NotEmpty,
}

impl Comparator {
    /// Every comparator, in declaration order.
    pub const ALL: [Self; 21] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Ge,
        Self::Lt,
        Self::Le,
        Self::In,
        Self::NotIn,
        Self::Contains,
        Self::NotContains,
        Self::ContainsIn,
        Self::ContainsAll,
        Self::NotContainsIn,
        Self::BeginsWith,
        Self::NotBeginsWith,
        Self::EndsWith,
        Self::NotEndsWith,
        Self::Regex,
        Self::NotRegex,
        Self::Empty,
        Self::NotEmpty,
    ];

    /// The comparator's spelling in requests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Contains => "contains",
            Self::NotContains => "not contains",
            Self::ContainsIn => "contains in",
            Self::ContainsAll => "contains all",
            Self::NotContainsIn => "not contains in",
            Self::BeginsWith => "begins with",
            Self::NotBeginsWith => "not begins with",
            Self::EndsWith => "ends with",
            Self::NotEndsWith => "not ends with",
            Self::Regex => "regex",
            Self::NotRegex => "not regex",
            Self::Empty => "empty",
            Self::NotEmpty => "not_empty",
        }
    }

    /// True for the six ordering comparators.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Gt | Self::Ge | Self::Lt | Self::Le
        )
    }

    /// True for comparators that ignore the constraint's value.
    #[must_use]
    pub const fn ignores_value(self) -> bool {
        matches!(self, Self::Empty | Self::NotEmpty)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::unsupported(format!("unknown comparator {s:?}")))
    }
}

/// A single `{name, comparator, value}` constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    name: String,
    comparator: Comparator,
    value: serde_json::Value,
}

impl Constraint {
    /// Creates a constraint. The value of `empty`/`not_empty` is discarded.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a valid column name.
    pub fn new(
        name: impl Into<String>,
        comparator: Comparator,
        value: impl Into<serde_json::Value>,
    ) -> CoreResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        let value = if comparator.ignores_value() {
            serde_json::Value::Null
        } else {
            value.into()
        };
        Ok(Self {
            name,
            comparator,
            value,
        })
    }

    /// Parses `{name, comparator, value}` with exactly those keys.
    ///
    /// # Errors
    ///
    /// Fails on any other shape, an unknown comparator or an invalid name.
    pub fn from_json(json: &serde_json::Value) -> CoreResult<Self> {
        let object = json.as_object().ok_or_else(|| {
            CoreError::validation(format!("constraint must be an object, got {json}"))
        })?;
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        if keys != ["comparator", "name", "value"] {
            return Err(CoreError::validation(format!(
                "constraint must have exactly the keys name, comparator, value; got {keys:?}"
            )));
        }
        let name = object["name"]
            .as_str()
            .ok_or_else(|| CoreError::validation("constraint name must be a string"))?;
        let comparator = object["comparator"]
            .as_str()
            .ok_or_else(|| CoreError::validation("constraint comparator must be a string"))?
            .parse()?;
        Self::new(name, comparator, object["value"].clone())
    }

    /// Constrained column.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operator.
    #[must_use]
    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    /// Operand; `null` for `empty`/`not_empty`.
    #[must_use]
    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

/// An OR-of-AND constraint tree. The empty tree matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConstraintGroups {
    groups: Vec<Vec<Constraint>>,
}

impl ConstraintGroups {
    /// Creates a tree from already built groups.
    #[must_use]
    pub fn new(groups: Vec<Vec<Constraint>>) -> Self {
        Self { groups }
    }

    /// Parses a tree from JSON.
    ///
    /// Groups and constraints may be given as arrays or as objects keyed by
    /// dense zero-based decimal indices. `null` is the empty tree.
    ///
    /// # Errors
    ///
    /// Fails on non-dense indices or any malformed constraint.
    pub fn from_json(json: &serde_json::Value) -> CoreResult<Self> {
        if json.is_null() {
            return Ok(Self::default());
        }
        let groups = dense_list(json, "constraint groups")?
            .into_iter()
            .enumerate()
            .map(|(g, group)| {
                dense_list(group, "constraint group")?
                    .into_iter()
                    .map(Constraint::from_json)
                    .collect::<CoreResult<Vec<_>>>()
                    .map_err(|err| CoreError::validation(format!("group {g}: {err}")))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self { groups })
    }

    /// The groups.
    #[must_use]
    pub fn groups(&self) -> &[Vec<Constraint>] {
        &self.groups
    }

    /// True if there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every referenced column name, in order of appearance.
    pub fn referenced_columns(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().flatten().map(Constraint::name)
    }
}

impl<'de> Deserialize<'de> for ConstraintGroups {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(&json).map_err(serde::de::Error::custom)
    }
}

fn dense_list<'a>(json: &'a serde_json::Value, what: &str) -> CoreResult<Vec<&'a serde_json::Value>> {
    match json {
        serde_json::Value::Array(items) => Ok(items.iter().collect()),
        serde_json::Value::Object(map) => (0..map.len())
            .map(|i| {
                map.get(&i.to_string()).ok_or_else(|| {
                    CoreError::validation(format!(
                        "{what} must be indexed 0..{} without gaps; missing index {i}",
                        map.len()
                    ))
                })
            })
            .collect(),
        other => Err(CoreError::validation(format!(
            "{what} must be a list, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comparator_spellings_round_trip() {
        for comparator in Comparator::ALL {
            assert_eq!(comparator.as_str().parse::<Comparator>().unwrap(), comparator);
            let json = serde_json::to_value(comparator).unwrap();
            assert_eq!(json, json!(comparator.as_str()));
        }
        assert!("like".parse::<Comparator>().is_err());
    }

    #[test]
    fn parses_array_tree() {
        let tree = ConstraintGroups::from_json(&json!([
            [{"name": "country", "comparator": "=", "value": "us"}],
            [{"name": "m", "comparator": ">", "value": 3},
             {"name": "site", "comparator": "empty", "value": "ignored"}]
        ]))
        .unwrap();
        assert_eq!(tree.groups().len(), 2);
        assert_eq!(tree.groups()[1][1].value(), &serde_json::Value::Null);
        assert_eq!(
            tree.referenced_columns().collect::<Vec<_>>(),
            ["country", "m", "site"]
        );
    }

    #[test]
    fn parses_dense_object_tree() {
        let tree = ConstraintGroups::from_json(&json!({
            "0": {"0": {"name": "a", "comparator": "in", "value": [1, 2]}},
            "1": [{"name": "b", "comparator": "regex", "value": "/x/i"}]
        }))
        .unwrap();
        assert_eq!(tree.groups()[0][0].comparator(), Comparator::In);
        assert_eq!(tree.groups()[1][0].name(), "b");
    }

    #[test]
    fn rejects_sparse_indices() {
        let err = ConstraintGroups::from_json(&json!({
            "1": [{"name": "a", "comparator": "=", "value": 1}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("missing index 0"));
    }

    #[test]
    fn rejects_wrong_constraint_keys() {
        for bad in [
            json!([[{"name": "a", "comparator": "="}]]),
            json!([[{"name": "a", "comparator": "=", "value": 1, "extra": 0}]]),
            json!([[{"name": "A", "comparator": "=", "value": 1}]]),
            json!([[{"name": "a", "comparator": "~", "value": 1}]]),
            json!([["not an object"]]),
            json!("not a list"),
        ] {
            assert!(ConstraintGroups::from_json(&bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn null_and_empty_trees_are_empty() {
        assert!(ConstraintGroups::from_json(&json!(null)).unwrap().is_empty());
        assert!(ConstraintGroups::from_json(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn deserializes_through_serde() {
        let tree: ConstraintGroups =
            serde_json::from_str(r#"[[{"name":"d","comparator":"contains","value":"x"}]]"#)
                .unwrap();
        assert_eq!(tree.groups()[0][0].comparator(), Comparator::Contains);
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!([[{"name": "d", "comparator": "contains", "value": "x"}]])
        );
    }
}

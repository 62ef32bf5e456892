//! Label and field selectors used to filter list and watch results.
//!
//! Both selectors parse from the comma-separated text form an API server
//! receives in query strings, e.g. `app=web,tier!=db,env in (prod,stage)`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Operator of a single label requirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// One clause of a [`LabelSelector`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

impl Requirement {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals => value == self.values.first(),
            Operator::NotEquals => value != self.values.first(),
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => !value.is_some_and(|v| self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.values.first().map(String::as_str).unwrap_or_default();
        match self.operator {
            Operator::Equals => write!(f, "{}={first}", self.key),
            Operator::NotEquals => write!(f, "{}!={first}", self.key),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// Conjunction of label requirements. The empty selector matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// The selector that matches every object.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selector requiring every `key=value` pair in `labels`.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let requirements = labels
            .into_iter()
            .map(|(k, v)| Requirement {
                key: k.to_string(),
                operator: Operator::Equals,
                values: vec![v.to_string()],
            })
            .collect();
        Self { requirements }
    }

    pub fn from_requirements(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }

    /// Parse the text form.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let mut requirements = Vec::new();
        for term in split_terms(input)? {
            requirements.push(parse_label_term(input, term)?);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// One clause of a [`FieldSelector`]: `field=value` or `field!=value`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRequirement {
    pub field: String,
    pub negated: bool,
    pub value: String,
}

/// Conjunction of field requirements. The empty selector matches everything.
///
/// Which fields exist is up to the store's schema for the kind; the selector
/// itself only carries names and values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selector requiring `field == value`.
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            requirements: vec![FieldRequirement {
                field: field.into(),
                negated: false,
                value: value.into(),
            }],
        }
    }

    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let mut requirements = Vec::new();
        for term in split_terms(input)? {
            let (field, negated, value) = if let Some((f, v)) = term.split_once("!=") {
                (f, true, v)
            } else if let Some((f, v)) = term.split_once("==") {
                (f, false, v)
            } else if let Some((f, v)) = term.split_once('=') {
                (f, false, v)
            } else {
                return Err(TypeError::selector(input, format!("{term:?} has no operator")));
            };
            let field = field.trim();
            if field.is_empty() {
                return Err(TypeError::selector(input, "empty field name"));
            }
            requirements.push(FieldRequirement {
                field: field.to_string(),
                negated,
                value: value.trim().to_string(),
            });
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.requirements
    }

    /// Names of every field this selector refers to.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.requirements.iter().map(|r| r.field.as_str())
    }

    /// Evaluate against resolved field values. A field missing from
    /// `fields` compares as the empty string.
    pub fn matches(&self, fields: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| {
            let actual = fields.get(&r.field).map(String::as_str).unwrap_or("");
            (actual == r.value) != r.negated
        })
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .requirements
            .iter()
            .map(|r| {
                let op = if r.negated { "!=" } else { "=" };
                format!("{}{op}{}", r.field, r.value)
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Split on commas that are not inside a parenthesised value set.
fn split_terms(input: &str) -> Result<Vec<&str>, TypeError> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| TypeError::selector(input, "unbalanced ')'"))?;
            }
            ',' if depth == 0 => {
                terms.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(TypeError::selector(input, "unbalanced '('"));
    }
    terms.push(&input[start..]);

    let trimmed: Vec<&str> = terms.into_iter().map(str::trim).collect();
    if trimmed.len() == 1 && trimmed[0].is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.iter().any(|t| t.is_empty()) {
        return Err(TypeError::selector(input, "empty term"));
    }
    Ok(trimmed)
}

fn parse_label_term(input: &str, term: &str) -> Result<Requirement, TypeError> {
    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement {
            key: label_key(input, key.trim())?,
            operator: Operator::DoesNotExist,
            values: Vec::new(),
        });
    }

    if let Some(open) = term.find('(') {
        let head: Vec<&str> = term[..open].split_whitespace().collect();
        let (key, operator) = match head.as_slice() {
            [key, "in"] => (*key, Operator::In),
            [key, "notin"] => (*key, Operator::NotIn),
            _ => return Err(TypeError::selector(input, format!("bad set term {term:?}"))),
        };
        let body = term[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| TypeError::selector(input, format!("{term:?} must end with ')'")))?;
        let values = body
            .split(',')
            .map(|v| label_value(input, v.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if values.iter().any(String::is_empty) {
            return Err(TypeError::selector(input, "empty value in set"));
        }
        return Ok(Requirement {
            key: label_key(input, key)?,
            operator,
            values,
        });
    }

    let (key, operator, value) = if let Some((k, v)) = term.split_once("!=") {
        (k, Operator::NotEquals, Some(v))
    } else if let Some((k, v)) = term.split_once("==") {
        (k, Operator::Equals, Some(v))
    } else if let Some((k, v)) = term.split_once('=') {
        (k, Operator::Equals, Some(v))
    } else {
        (term, Operator::Exists, None)
    };

    Ok(Requirement {
        key: label_key(input, key.trim())?,
        operator,
        values: match value {
            Some(v) => vec![label_value(input, v.trim())?],
            None => Vec::new(),
        },
    })
}

fn label_key(input: &str, key: &str) -> Result<String, TypeError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(key.to_string())
    } else {
        Err(TypeError::selector(input, format!("invalid label key {key:?}")))
    }
}

fn label_value(input: &str, value: &str) -> Result<String, TypeError> {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        Ok(value.to_string())
    } else {
        Err(TypeError::selector(input, format!("invalid label value {value:?}")))
    }
}

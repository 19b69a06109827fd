//! # Service Filters
//!
//! Predicates over service [`Properties`], written either as LDAP-style filter
//! strings or built directly as a [`Filter`] tree.
//!
//! ```text
//! (&(objectClass=*Greeter)(|(lang=en)(lang=de))(!(service.ranking<=0)))
//! ```
//!
//! ## Operators
//!
//! * `(attr=value)` - exact match; `(attr=*)` tests presence and values with
//!   unescaped `*` are substring patterns
//! * `(attr~=value)` - approximate match, ignoring case and whitespace
//! * `(attr>=value)` / `(attr<=value)` - ordering, numeric when both sides are
//!   numbers and lexicographic otherwise
//! * `(&...)`, `(|...)`, `(!...)` - conjunction, disjunction, negation
//!
//! Attributes missing from the properties never match. Inside attribute names,
//! operator characters and parentheses are escaped with `\`.

mod parser;

use std::{cmp::Ordering, fmt, str::FromStr};

use thiserror::Error;

use crate::properties::Properties;

pub use parser::parse_filter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal {
        attribute: String,
        value: String,
    },
    Approx {
        attribute: String,
        value: String,
    },
    GreaterEq {
        attribute: String,
        value: String,
    },
    LessEq {
        attribute: String,
        value: String,
    },
    Present(String),
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl Filter {
    pub fn parse(input: &str) -> FilterResult<Self> {
        parse_filter(input)
    }

    pub fn equal(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equal {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn approx(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Approx {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn greater_eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::GreaterEq {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn less_eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::LessEq {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present(attribute.into())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Evaluate the filter against a property mapping.
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(properties)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(properties)),
            Filter::Not(filter) => !filter.matches(properties),
            Filter::Present(attribute) => properties.contains_key(attribute),
            Filter::Equal { attribute, value } => {
                properties.get(attribute).is_some_and(|actual| actual == value)
            }
            Filter::Approx { attribute, value } => properties
                .get(attribute)
                .is_some_and(|actual| normalize_approx(actual) == normalize_approx(value)),
            Filter::GreaterEq { attribute, value } => properties
                .get(attribute)
                .is_some_and(|actual| compare_values(actual, value) != Ordering::Less),
            Filter::LessEq { attribute, value } => properties
                .get(attribute)
                .is_some_and(|actual| compare_values(actual, value) != Ordering::Greater),
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            } => properties.get(attribute).is_some_and(|actual| {
                matches_substring(actual, initial.as_deref(), any, last.as_deref())
            }),
        }
    }
}

fn normalize_approx(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn compare_values(actual: &str, expected: &str) -> Ordering {
    let (a, e) = (actual.trim(), expected.trim());
    if let (Ok(a), Ok(e)) = (a.parse::<i64>(), e.parse::<i64>()) {
        return a.cmp(&e);
    }
    if let (Ok(a), Ok(e)) = (a.parse::<f64>(), e.parse::<f64>()) {
        if let Some(ordering) = a.partial_cmp(&e) {
            return ordering;
        }
    }
    actual.cmp(expected)
}

fn matches_substring(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let mut rest = value;
    if let Some(initial) = initial {
        match rest.strip_prefix(initial) {
            Some(remaining) => rest = remaining,
            None => return false,
        }
    }
    for part in any {
        match rest.find(part.as_str()) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    // the final segment must lie after everything already consumed
    last.map_or(true, |last| rest.ends_with(last))
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '(' | ')' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// attributes end at the first operator or parenthesis unless escaped
fn escape_attribute(attribute: &str) -> String {
    let mut escaped = String::with_capacity(attribute.len());
    for c in attribute.chars() {
        if matches!(c, '\\' | '(' | ')' | '=' | '~' | '<' | '>') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::Equal { attribute, value } => {
                write!(f, "({}={})", escape_attribute(attribute), escape_value(value))
            }
            Filter::Approx { attribute, value } => {
                write!(f, "({}~={})", escape_attribute(attribute), escape_value(value))
            }
            Filter::GreaterEq { attribute, value } => {
                write!(f, "({}>={})", escape_attribute(attribute), escape_value(value))
            }
            Filter::LessEq { attribute, value } => {
                write!(f, "({}<={})", escape_attribute(attribute), escape_value(value))
            }
            Filter::Present(attribute) => write!(f, "({}=*)", escape_attribute(attribute)),
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", escape_attribute(attribute))?;
                if let Some(initial) = initial {
                    write!(f, "{}", escape_value(initial))?;
                }
                write!(f, "*")?;
                for part in any {
                    write!(f, "{}*", escape_value(part))?;
                }
                if let Some(last) = last {
                    write!(f, "{}", escape_value(last))?;
                }
                write!(f, ")")
            }
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_filter(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid filter syntax in \"{filter}\": {message}")]
    InvalidSyntax { filter: String, message: String },
}

pub type FilterResult<T> = Result<T, FilterError>;

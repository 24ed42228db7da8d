use std::cmp::Ordering;

use crate::mapi::{PropTag, PropValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relop {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Relop {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Relop::Lt => ordering.is_lt(),
            Relop::Le => ordering.is_le(),
            Relop::Gt => ordering.is_gt(),
            Relop::Ge => ordering.is_ge(),
            Relop::Eq => ordering.is_eq(),
            Relop::Ne => ordering.is_ne(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzyLevel {
    FullString,
    Substring,
    Prefix,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    And(Vec<Restriction>),
    Or(Vec<Restriction>),
    Not(Box<Restriction>),
    Property {
        relop: Relop,
        tag: PropTag,
        value: PropValue,
    },
    Content {
        level: FuzzyLevel,
        ignore_case: bool,
        tag: PropTag,
        value: String,
    },
    Exist(PropTag),
}

impl Restriction {
    /// Evaluates the restriction against a row whose values are produced by
    /// `lookup`. Missing properties never satisfy a comparison.
    pub fn evaluate(&self, lookup: &mut impl FnMut(PropTag) -> Option<PropValue>) -> bool {
        match self {
            Restriction::And(children) => children.iter().all(|child| child.evaluate(lookup)),
            Restriction::Or(children) => children.iter().any(|child| child.evaluate(lookup)),
            Restriction::Not(child) => !child.evaluate(lookup),
            Restriction::Property { relop, tag, value } => lookup(*tag)
                .and_then(|actual| actual.compare(value))
                .is_some_and(|ordering| relop.holds(ordering)),
            Restriction::Content {
                level,
                ignore_case,
                tag,
                value,
            } => lookup(*tag).is_some_and(|actual| {
                let Some(actual) = actual.as_str() else {
                    return false;
                };
                let (actual, needle) = if *ignore_case {
                    (actual.to_lowercase(), value.to_lowercase())
                } else {
                    (actual.to_string(), value.clone())
                };
                match level {
                    FuzzyLevel::FullString => actual == needle,
                    FuzzyLevel::Substring => actual.contains(&needle),
                    FuzzyLevel::Prefix => actual.starts_with(&needle),
                }
            }),
            Restriction::Exist(tag) => lookup(*tag).is_some(),
        }
    }

    /// Every tag the restriction reads.
    pub fn tags(&self) -> Vec<PropTag> {
        let mut tags = Vec::new();
        self.collect_tags(&mut tags);
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    fn collect_tags(&self, tags: &mut Vec<PropTag>) {
        match self {
            Restriction::And(children) | Restriction::Or(children) => {
                for child in children {
                    child.collect_tags(tags);
                }
            }
            Restriction::Not(child) => child.collect_tags(tags),
            Restriction::Property { tag, .. }
            | Restriction::Content { tag, .. }
            | Restriction::Exist(tag) => tags.push(*tag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub tag: PropTag,
    pub ascending: bool,
}

impl SortOrder {
    pub fn ascending(tag: PropTag) -> Self {
        Self {
            tag,
            ascending: true,
        }
    }

    pub fn descending(tag: PropTag) -> Self {
        Self {
            tag,
            ascending: false,
        }
    }
}

/// Compares two rows of sort keys, laid out in the same order as `orders`.
/// Rows missing a key sort after rows that have it.
pub fn compare_sort_keys(
    orders: &[SortOrder],
    a: &[Option<PropValue>],
    b: &[Option<PropValue>],
) -> Ordering {
    for (index, order) in orders.iter().enumerate() {
        let ordering = match (&a[index], &b[index]) {
            (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = if order.ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering.is_ne() {
            return ordering;
        }
    }
    Ordering::Equal
}

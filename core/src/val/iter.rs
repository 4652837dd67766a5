//! Iteration handles.
//!
//! While an `Iter` over a mutable container is alive, the container counts
//! as under iteration and rejects mutation. The count is released on drop,
//! which also covers unwinding out of a loop on error.

use std::sync::Arc;

use super::dict::{Dict, Set};
use super::list::List;
use super::range::RangeValue;
use super::Value;

pub struct Iter {
    kind: IterKind,
}

enum IterKind {
    List { list: Arc<List>, i: usize },
    Tuple { items: Arc<[Value]>, i: usize },
    Dict { dict: Arc<Dict>, i: usize },
    Set { set: Arc<Set>, i: usize },
    Range { range: Arc<RangeValue>, i: usize },
    Foreign(Box<dyn Iterator<Item = Value> + Send>),
}

impl Iter {
    pub(crate) fn list(list: Arc<List>) -> Iter {
        list.begin_iteration();
        Iter {
            kind: IterKind::List { list, i: 0 },
        }
    }

    pub(crate) fn tuple(items: Arc<[Value]>) -> Iter {
        Iter {
            kind: IterKind::Tuple { items, i: 0 },
        }
    }

    pub(crate) fn dict(dict: Arc<Dict>) -> Iter {
        dict.begin_iteration();
        Iter {
            kind: IterKind::Dict { dict, i: 0 },
        }
    }

    pub(crate) fn set(set: Arc<Set>) -> Iter {
        set.begin_iteration();
        Iter {
            kind: IterKind::Set { set, i: 0 },
        }
    }

    pub(crate) fn range(range: Arc<RangeValue>) -> Iter {
        Iter {
            kind: IterKind::Range { range, i: 0 },
        }
    }

    pub(crate) fn foreign(it: Box<dyn Iterator<Item = Value> + Send>) -> Iter {
        Iter {
            kind: IterKind::Foreign(it),
        }
    }
}

impl Iterator for Iter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match &mut self.kind {
            IterKind::List { list, i } => {
                let v = list.get(*i)?;
                *i += 1;
                Some(v)
            }
            IterKind::Tuple { items, i } => {
                let v = items.get(*i)?.clone();
                *i += 1;
                Some(v)
            }
            IterKind::Dict { dict, i } => {
                let v = dict.key_at(*i)?;
                *i += 1;
                Some(v)
            }
            IterKind::Set { set, i } => {
                let v = set.key_at(*i)?;
                *i += 1;
                Some(v)
            }
            IterKind::Range { range, i } => {
                if *i >= range.len() {
                    return None;
                }
                let v = range.at(*i);
                *i += 1;
                Some(Value::int(v))
            }
            IterKind::Foreign(it) => it.next(),
        }
    }
}

impl Drop for Iter {
    fn drop(&mut self) {
        match &self.kind {
            IterKind::List { list, .. } => list.end_iteration(),
            IterKind::Dict { dict, .. } => dict.end_iteration(),
            IterKind::Set { set, .. } => set.end_iteration(),
            _ => {}
        }
    }
}

// ── Table reconciler ──
//
// Merges freshly observed rows of a repeated block with the rows the prior
// state knew about. List tables keep the device's order; set tables are
// put into a canonical order by key so that the same membership always
// yields the same state regardless of how the device orders it.

use std::cmp::Ordering;

use crate::context::SortOrder;
use crate::schema::FieldKind;
use crate::value::{Scalar, StateTree, StateValue};

/// One reconciled row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// Value of the table's key field, if the row has one.
    pub key: Option<Scalar>,
    pub fields: StateTree,
    /// A row with the same key existed in the prior state.
    pub tf_exists: bool,
}

/// Reconcile `fresh_rows` against `prior_rows`.
///
/// Rows present only in the prior are dropped. For set tables the result
/// is stably sorted by key; rows without a key go last in fresh order.
pub fn reconcile_table(
    prior_rows: &[StateTree],
    fresh_rows: Vec<StateTree>,
    key_field: &str,
    kind: FieldKind,
    sort: SortOrder,
) -> Vec<TableRow> {
    let prior_keys: Vec<&Scalar> = prior_rows
        .iter()
        .filter_map(|row| row.get(key_field).as_scalar())
        .collect();

    let mut rows: Vec<TableRow> = fresh_rows
        .into_iter()
        .map(|fields| {
            let key = fields.get(key_field).as_scalar().cloned();
            let tf_exists = key
                .as_ref()
                .is_some_and(|k| prior_keys.iter().any(|p| keys_equal(p, k)));
            TableRow {
                key,
                fields,
                tf_exists,
            }
        })
        .collect();

    if kind == FieldKind::SetOfObject {
        rows.sort_by(|a, b| compare_keys(a.key.as_ref(), b.key.as_ref(), sort));
    }
    rows
}

/// Find the prior row whose key equals `key`.
pub fn find_row<'a>(rows: &'a [StateTree], key_field: &str, key: &Scalar) -> Option<&'a StateTree> {
    rows.iter().find(|row| {
        row.get(key_field)
            .as_scalar()
            .is_some_and(|k| keys_equal(k, key))
    })
}

/// Rebuild a state value from reconciled rows.
pub fn into_state(rows: Vec<TableRow>, kind: FieldKind) -> StateValue {
    let trees = rows.into_iter().map(|row| row.fields).collect();
    if kind == FieldKind::SetOfObject {
        StateValue::Set(trees)
    } else {
        StateValue::List(trees)
    }
}

/// Sort rows of a set canonically (used to compare sets for equivalence).
pub fn canonical_rows<'a>(rows: &'a [StateTree], key_field: &str, sort: SortOrder) -> Vec<&'a StateTree> {
    let mut sorted: Vec<&'a StateTree> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        compare_keys(
            a.get(key_field).as_scalar(),
            b.get(key_field).as_scalar(),
            sort,
        )
    });
    sorted
}

fn keys_equal(a: &Scalar, b: &Scalar) -> bool {
    compare_scalars(a, b, SortOrder::Lexicographic) == Ordering::Equal
}

/// Missing keys sort after every present key.
pub fn compare_keys(a: Option<&Scalar>, b: Option<&Scalar>, sort: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_scalars(a, b, sort),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Booleans, then numbers (compared numerically), then strings.
#[allow(clippy::cast_precision_loss)]
fn compare_scalars(a: &Scalar, b: &Scalar, sort: SortOrder) -> Ordering {
    fn rank(s: &Scalar) -> u8 {
        match s {
            Scalar::Bool(_) => 0,
            Scalar::Int(_) | Scalar::Float(_) => 1,
            Scalar::Str(_) => 2,
        }
    }

    match (a, b) {
        (Scalar::Bool(x), Scalar::Bool(y)) => x.cmp(y),
        (Scalar::Int(x), Scalar::Int(y)) => x.cmp(y),
        (Scalar::Int(x), Scalar::Float(y)) => (*x as f64).total_cmp(y),
        (Scalar::Float(x), Scalar::Int(y)) => x.total_cmp(&(*y as f64)),
        (Scalar::Float(x), Scalar::Float(y)) => x.total_cmp(y),
        (Scalar::Str(x), Scalar::Str(y)) => match sort {
            SortOrder::Lexicographic => x.cmp(y),
            SortOrder::Natural => natural_cmp(x, y),
        },
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare strings treating each run of ASCII digits as a number.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ta, tb) = (tokens(a), tokens(b));
    for (x, y) in ta.iter().zip(&tb) {
        let ord = match (is_digits(x), is_digits(y)) {
            (true, true) => {
                let (xs, ys) = (x.trim_start_matches('0'), y.trim_start_matches('0'));
                xs.len().cmp(&ys.len()).then_with(|| xs.cmp(ys))
            }
            _ => x.cmp(y),
        };
        if ord.is_ne() {
            return ord;
        }
    }
    ta.len().cmp(&tb.len()).then_with(|| a.cmp(b))
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn tokens(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = s.as_bytes();
    for idx in 1..bytes.len() {
        if bytes[idx].is_ascii_digit() != bytes[idx - 1].is_ascii_digit() {
            out.push(&s[start..idx]);
            start = idx;
        }
    }
    if start < s.len() {
        out.push(&s[start..]);
    }
    out
}

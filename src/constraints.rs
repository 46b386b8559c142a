//! Bonding-capacity constraints.
//!
//! A constraint table maps an atom key — an element symbol, optionally with a
//! signed charge suffix (`"C"`, `"N+1"`, `"O-1"`) — to the maximum sum of
//! bond orders that atom may carry. The key `"?"` is the fallback for atoms
//! not otherwise listed. The installed table is process-wide state: every
//! encoder and decoder call reads it, and swapping it atomically rebuilds the
//! two derived caches (the per-(element, charge) capacity memo and the
//! semantic-robust alphabet).

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{LazyLock, PoisonError, RwLock};

use crate::element::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintsError {
    UnknownPreset(String),
    MissingWildcard,
    InvalidKey(String),
}

impl fmt::Display for ConstraintsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPreset(name) => write!(f, "unknown constraints preset '{}'", name),
            Self::MissingWildcard => write!(f, "constraint table must contain the '?' key"),
            Self::InvalidKey(key) => write!(
                f,
                "invalid constraint key '{}': expected an element symbol, \
                 optionally followed by a signed charge (e.g. 'N+1')",
                key
            ),
        }
    }
}

impl std::error::Error for ConstraintsError {}

struct ConstraintState {
    table: HashMap<String, u8>,
    wildcard: u8,
    // derived caches, rebuilt whenever the table is swapped
    capacity_memo: HashMap<(Element, i8), u8>,
    robust_alphabet: BTreeSet<String>,
}

impl ConstraintState {
    fn build(table: HashMap<String, u8>) -> Result<Self, ConstraintsError> {
        let wildcard = *table.get("?").ok_or(ConstraintsError::MissingWildcard)?;

        let mut capacity_memo = HashMap::with_capacity(table.len());
        for (key, &cap) in &table {
            if key == "?" {
                continue;
            }
            let parsed =
                parse_key(key).ok_or_else(|| ConstraintsError::InvalidKey(key.clone()))?;
            capacity_memo.insert(parsed, cap);
        }

        let robust_alphabet = build_robust_alphabet(&table);

        Ok(Self {
            table,
            wildcard,
            capacity_memo,
            robust_alphabet,
        })
    }
}

fn parse_key(key: &str) -> Option<(Element, i8)> {
    let sign_at = key.find(['+', '-']);
    let (elem_part, charge) = match sign_at {
        Some(i) => {
            let (elem, suffix) = key.split_at(i);
            (elem, suffix.parse::<i8>().ok().filter(|&c| c != 0)?)
        }
        None => (key, 0),
    };
    let element = Element::from_symbol(elem_part)?;
    Some((element, charge))
}

fn build_robust_alphabet(table: &HashMap<String, u8>) -> BTreeSet<String> {
    let mut alphabet = BTreeSet::new();

    for (key, &cap) in table {
        if key == "?" || key == "H" {
            continue;
        }
        for (prefix, order) in [("", 1), ("=", 2), ("#", 3)] {
            if order <= cap {
                alphabet.insert(format!("[{}{}]", prefix, key));
            }
        }
    }

    for i in 1..=3 {
        alphabet.insert(format!("[Ring{}]", i));
        alphabet.insert(format!("[=Ring{}]", i));
        alphabet.insert(format!("[Branch{}]", i));
        alphabet.insert(format!("[=Branch{}]", i));
        alphabet.insert(format!("[#Branch{}]", i));
    }

    alphabet
}

fn default_table() -> HashMap<String, u8> {
    let entries: &[(&str, u8)] = &[
        ("H", 1),
        ("F", 1),
        ("Cl", 1),
        ("Br", 1),
        ("I", 1),
        ("B", 3),
        ("B+1", 2),
        ("B-1", 4),
        ("O", 2),
        ("O+1", 3),
        ("O-1", 1),
        ("N", 3),
        ("N+1", 4),
        ("N-1", 2),
        ("C", 4),
        ("C+1", 5),
        ("C-1", 3),
        ("P", 5),
        ("P+1", 6),
        ("P-1", 4),
        ("S", 6),
        ("S+1", 7),
        ("S-1", 5),
        ("?", 8),
    ];
    entries.iter().map(|&(k, v)| (k.to_owned(), v)).collect()
}

/// Returns one of the three built-in constraint presets.
///
/// `default` follows common organic valences, `octet_rule` restricts S and P
/// to their octet valences, and `hypervalent` widens the halogens and P.
pub fn get_preset_constraints(name: &str) -> Result<HashMap<String, u8>, ConstraintsError> {
    let mut table = default_table();
    match name {
        "default" => {}
        "octet_rule" => {
            for (k, v) in [("S", 2), ("S+1", 3), ("S-1", 1), ("P", 3), ("P+1", 4), ("P-1", 2)] {
                table.insert(k.to_owned(), v);
            }
        }
        "hypervalent" => {
            for (k, v) in [("Cl", 7), ("Br", 7), ("I", 7), ("P", 7)] {
                table.insert(k.to_owned(), v);
            }
        }
        _ => return Err(ConstraintsError::UnknownPreset(name.to_owned())),
    }
    Ok(table)
}

static STATE: LazyLock<RwLock<ConstraintState>> = LazyLock::new(|| {
    let state = ConstraintState::build(default_table())
        .unwrap_or_else(|_| unreachable!("built-in default constraints are valid"));
    RwLock::new(state)
});

/// Returns a fresh copy of the installed constraint table. Mutating the
/// returned map has no effect on the process-wide state.
pub fn get_semantic_constraints() -> HashMap<String, u8> {
    STATE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .table
        .clone()
}

/// Installs a new constraint table and rebuilds the derived caches.
///
/// The table must contain the fallback key `"?"`, and every other key must
/// be an element symbol optionally followed by a signed non-zero charge.
pub fn set_semantic_constraints(table: HashMap<String, u8>) -> Result<(), ConstraintsError> {
    let state = ConstraintState::build(table)?;
    *STATE.write().unwrap_or_else(PoisonError::into_inner) = state;
    Ok(())
}

/// All SELFIES symbols the codec considers valid under the installed
/// constraints: one atom symbol per (key, bond order) pair that fits the
/// key's capacity, plus the branch and ring symbols.
pub fn get_semantic_robust_alphabet() -> BTreeSet<String> {
    STATE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .robust_alphabet
        .clone()
}

/// Maximum bond-order sum for an atom of the given element and charge,
/// before explicit hydrogens are subtracted.
pub(crate) fn bonding_capacity(element: Element, charge: i8) -> u8 {
    let state = STATE.read().unwrap_or_else(PoisonError::into_inner);
    state
        .capacity_memo
        .get(&(element, charge))
        .copied()
        .unwrap_or(state.wildcard)
}

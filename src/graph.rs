//! Molecular graph shared by the SELFIES decoder and the SMILES parser.
//!
//! Atoms live in a dense, append-only vector; their indices are never
//! recycled. Bonds are directed: an ordinary bond is stored once, in its
//! source atom's outgoing adjacency list (source index < destination index),
//! while a ring bond is stored twice, once per direction, and the two entries
//! are kept in lockstep. Adjacency order is significant — it is the traversal
//! order of SELFIES generation — which is why ring bonds can be inserted at a
//! reserved position.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::constraints;
use crate::element::Element;

/// Tetrahedral chirality marker (`@` = counterclockwise, `@@` = clockwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Chirality {
    #[default]
    None,
    /// Counterclockwise (@).
    Ccw,
    /// Clockwise (@@).
    Cw,
}

impl Chirality {
    pub fn flipped(self) -> Self {
        match self {
            Chirality::None => Chirality::None,
            Chirality::Ccw => Chirality::Cw,
            Chirality::Cw => Chirality::Ccw,
        }
    }
}

/// Directional single-bond marker used for E/Z stereo (`/` or `\`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondStereo {
    Up,
    Down,
}

impl BondStereo {
    pub fn as_char(self) -> char {
        match self {
            BondStereo::Up => '/',
            BondStereo::Down => '\\',
        }
    }

    /// The marker as seen from the opposite bond direction.
    pub fn flipped(self) -> Self {
        match self {
            BondStereo::Up => BondStereo::Down,
            BondStereo::Down => BondStereo::Up,
        }
    }
}

/// Bond order. `Aromatic` is the order-1.5 placeholder that exists only
/// between SMILES parsing and kekulization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Order in half-bond units, so the aromatic order 1.5 stays integral.
    pub(crate) fn units(self) -> u16 {
        match self {
            BondOrder::Single => 2,
            BondOrder::Double => 4,
            BondOrder::Triple => 6,
            BondOrder::Aromatic => 3,
        }
    }

    /// Whole bond order; aromatic bonds count as 1.
    pub fn as_int(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Aromatic => 1,
        }
    }

    /// Order from a whole number already clamped to 1..=3.
    pub fn from_int(order: u8) -> BondOrder {
        match order {
            2 => BondOrder::Double,
            3 => BondOrder::Triple,
            _ => BondOrder::Single,
        }
    }
}

/// A single input token that contributed to an output token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    /// Position of the token in the input string's token sequence.
    pub index: usize,
    /// The token text, e.g. `"[C]"` or `"Br"`.
    pub token: String,
}

/// One output token together with the input tokens it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAttribution {
    pub token: String,
    pub attribution: Vec<Attribution>,
}

/// Attribution for every token of a codec output, in output order.
pub type AttributionMap = Vec<TokenAttribution>;

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub element: Element,
    pub is_aromatic: bool,
    pub isotope: Option<u16>,
    pub chirality: Chirality,
    /// Explicit hydrogen count. `None` means the count is implied by
    /// valence, as for bare organic-subset atoms in SMILES.
    pub h_count: Option<u8>,
    pub charge: i8,
    capacity: u8,
}

impl Atom {
    pub fn new(
        element: Element,
        is_aromatic: bool,
        isotope: Option<u16>,
        chirality: Chirality,
        h_count: Option<u8>,
        charge: i8,
    ) -> Atom {
        let capacity = constraints::bonding_capacity(element, charge)
            .saturating_sub(h_count.unwrap_or(0));
        Atom {
            element,
            is_aromatic,
            isotope,
            chirality,
            h_count,
            charge,
            capacity,
        }
    }

    /// Maximum sum of bond orders this atom may carry, under the constraint
    /// table that was installed when the atom was created. Explicit
    /// hydrogens are already subtracted.
    pub fn bonding_capacity(&self) -> u8 {
        self.capacity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectedBond {
    pub src: usize,
    pub dst: usize,
    pub order: BondOrder,
    pub stereo: Option<BondStereo>,
    pub ring_bond: bool,
}

#[derive(Debug, Default, PartialEq)]
struct AttributionStore {
    atoms: HashMap<usize, Vec<Attribution>>,
    // keyed by (min, max) endpoint pair
    bonds: HashMap<(usize, usize), Vec<Attribution>>,
}

#[derive(Debug, PartialEq)]
pub struct MolecularGraph {
    atoms: Vec<Atom>,
    roots: Vec<usize>,
    adjacency: Vec<Vec<DirectedBond>>,
    bond_pairs: HashSet<(usize, usize)>,
    // incident bond-order sums in half-bond units
    bond_units: Vec<u16>,
    ring_bond_flags: Vec<bool>,
    // ordered maps so kekulization visits vertices deterministically
    aromatic_subgraph: BTreeMap<usize, BTreeSet<usize>>,
    attributions: Option<AttributionStore>,
}

fn pair_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

impl MolecularGraph {
    pub fn new(track_attribution: bool) -> Self {
        Self {
            atoms: Vec::new(),
            roots: Vec::new(),
            adjacency: Vec::new(),
            bond_pairs: HashSet::new(),
            bond_units: Vec::new(),
            ring_bond_flags: Vec::new(),
            aromatic_subgraph: BTreeMap::new(),
            attributions: track_attribution.then(AttributionStore::default),
        }
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atom(&self, idx: usize) -> &Atom {
        &self.atoms[idx]
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> + '_ {
        self.atoms.iter()
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Outgoing bonds of an atom, in traversal order.
    pub fn out_bonds(&self, idx: usize) -> &[DirectedBond] {
        &self.adjacency[idx]
    }

    /// Appends an atom and returns its index.
    pub fn add_atom(&mut self, atom: Atom, mark_root: bool) -> usize {
        let idx = self.atoms.len();
        if mark_root {
            self.roots.push(idx);
        }
        if atom.is_aromatic {
            self.aromatic_subgraph.entry(idx).or_default();
        }
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.bond_units.push(0);
        self.ring_bond_flags.push(false);
        idx
    }

    /// Adds an ordinary (non-ring) bond. The bond is stored in the source
    /// atom's adjacency list only; `src < dst` is required.
    pub fn add_bond(
        &mut self,
        src: usize,
        dst: usize,
        order: BondOrder,
        stereo: Option<BondStereo>,
    ) {
        debug_assert!(src < dst, "bond source must precede destination");
        debug_assert!(!self.has_bond(src, dst), "duplicate bond {src}-{dst}");
        self.adjacency[src].push(DirectedBond {
            src,
            dst,
            order,
            stereo,
            ring_bond: false,
        });
        self.bond_pairs.insert(pair_key(src, dst));
        self.bond_units[src] += order.units();
        self.bond_units[dst] += order.units();
        if order == BondOrder::Aromatic {
            self.aromatic_subgraph.entry(src).or_default().insert(dst);
            self.aromatic_subgraph.entry(dst).or_default().insert(src);
        }
    }

    /// Adds a ring bond as a matched pair of directed bonds. `a_pos` /
    /// `b_pos` insert at a reserved slot in the respective adjacency list;
    /// `None` appends.
    #[allow(clippy::too_many_arguments)]
    pub fn add_ring_bond(
        &mut self,
        a: usize,
        b: usize,
        order: BondOrder,
        a_stereo: Option<BondStereo>,
        b_stereo: Option<BondStereo>,
        a_pos: Option<usize>,
        b_pos: Option<usize>,
    ) {
        debug_assert!(a != b, "ring bond endpoints must differ");
        debug_assert!(!self.has_bond(a, b), "duplicate ring bond {a}-{b}");
        let forward = DirectedBond {
            src: a,
            dst: b,
            order,
            stereo: a_stereo,
            ring_bond: true,
        };
        let backward = DirectedBond {
            src: b,
            dst: a,
            order,
            stereo: b_stereo,
            ring_bond: true,
        };
        match a_pos {
            Some(pos) if pos <= self.adjacency[a].len() => self.adjacency[a].insert(pos, forward),
            _ => self.adjacency[a].push(forward),
        }
        match b_pos {
            Some(pos) if pos <= self.adjacency[b].len() => self.adjacency[b].insert(pos, backward),
            _ => self.adjacency[b].push(backward),
        }
        self.bond_pairs.insert(pair_key(a, b));
        self.bond_units[a] += order.units();
        self.bond_units[b] += order.units();
        self.ring_bond_flags[a] = true;
        self.ring_bond_flags[b] = true;
        if order == BondOrder::Aromatic {
            self.aromatic_subgraph.entry(a).or_default().insert(b);
            self.aromatic_subgraph.entry(b).or_default().insert(a);
        }
    }

    /// Rewrites the order of an existing bond, keeping both directions of a
    /// ring bond and both endpoints' bond counts in sync.
    pub fn update_bond_order(&mut self, a: usize, b: usize, new_order: BondOrder) {
        debug_assert!(new_order != BondOrder::Aromatic);
        let mut old_order = None;
        for (x, y) in [(a, b), (b, a)] {
            if let Some(bond) = self.adjacency[x].iter_mut().find(|bd| bd.dst == y) {
                old_order = Some(bond.order);
                bond.order = new_order;
            }
        }
        if let Some(old) = old_order {
            for idx in [a, b] {
                self.bond_units[idx] = self.bond_units[idx] - old.units() + new_order.units();
            }
        }
    }

    pub fn has_bond(&self, a: usize, b: usize) -> bool {
        self.bond_pairs.contains(&pair_key(a, b))
    }

    /// The bond from `src` to `dst`. If only the opposite orientation is
    /// stored, the reverse is synthesized with its stereo marker flipped.
    pub fn get_dir_bond(&self, src: usize, dst: usize) -> Option<DirectedBond> {
        if !self.has_bond(src, dst) {
            return None;
        }
        if let Some(bond) = self.adjacency[src].iter().find(|bd| bd.dst == dst) {
            return Some(*bond);
        }
        self.adjacency[dst]
            .iter()
            .find(|bd| bd.dst == src)
            .map(|bd| DirectedBond {
                src,
                dst,
                order: bd.order,
                stereo: bd.stereo.map(BondStereo::flipped),
                ring_bond: bd.ring_bond,
            })
    }

    /// Whole bonds the atom can still accept.
    pub fn free_bonds(&self, idx: usize) -> u8 {
        let cap_units = u16::from(self.atoms[idx].bonding_capacity()) * 2;
        let used = self.bond_units[idx];
        if used >= cap_units {
            0
        } else {
            ((cap_units - used) / 2) as u8
        }
    }

    /// True if the atom's incident bond orders exceed its capacity.
    pub fn exceeds_capacity(&self, idx: usize) -> bool {
        self.bond_units[idx] > u16::from(self.atoms[idx].bonding_capacity()) * 2
    }

    pub fn has_out_ring_bond(&self, idx: usize) -> bool {
        self.ring_bond_flags[idx]
    }

    pub fn is_kekulized(&self) -> bool {
        self.aromatic_subgraph.is_empty()
    }

    /// Replaces aromatic bonds with alternating single and double bonds.
    /// Returns false if the aromatic system admits no perfect matching.
    pub fn kekulize(&mut self) -> bool {
        crate::kekulize::kekulize(self)
    }

    pub(crate) fn aromatic_subgraph(&self) -> &BTreeMap<usize, BTreeSet<usize>> {
        &self.aromatic_subgraph
    }

    pub(crate) fn clear_aromatic_flag(&mut self, idx: usize) {
        self.atoms[idx].is_aromatic = false;
    }

    pub(crate) fn clear_aromatic_subgraph(&mut self) {
        self.aromatic_subgraph.clear();
    }

    /// Incident bonds of every atom: outgoing bonds plus the reverse of
    /// bonds stored at the other endpoint. Ring bonds appear once per
    /// endpoint.
    pub(crate) fn incident_bonds(&self) -> Vec<Vec<DirectedBond>> {
        let mut incident: Vec<Vec<DirectedBond>> = vec![Vec::new(); self.atoms.len()];
        for list in &self.adjacency {
            for bond in list {
                incident[bond.src].push(*bond);
                if !bond.ring_bond {
                    incident[bond.dst].push(DirectedBond {
                        src: bond.dst,
                        dst: bond.src,
                        order: bond.order,
                        stereo: bond.stereo.map(BondStereo::flipped),
                        ring_bond: false,
                    });
                }
            }
        }
        incident
    }

    pub(crate) fn tracks_attribution(&self) -> bool {
        self.attributions.is_some()
    }

    pub(crate) fn attribute_atom(&mut self, idx: usize, attribution: Vec<Attribution>) {
        if let Some(store) = self.attributions.as_mut() {
            store.atoms.insert(idx, attribution);
        }
    }

    pub(crate) fn attribute_bond(&mut self, a: usize, b: usize, attribution: Vec<Attribution>) {
        if let Some(store) = self.attributions.as_mut() {
            store.bonds.insert(pair_key(a, b), attribution);
        }
    }

    pub fn atom_attribution(&self, idx: usize) -> &[Attribution] {
        self.attributions
            .as_ref()
            .and_then(|store| store.atoms.get(&idx))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn bond_attribution(&self, a: usize, b: usize) -> &[Attribution] {
        self.attributions
            .as_ref()
            .and_then(|store| store.bonds.get(&pair_key(a, b)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

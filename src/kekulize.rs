//! Kekulization: replacing order-1.5 aromatic bonds with alternating single
//! and double bonds that respect every atom's bonding capacity.
//!
//! Vertices that provably cannot host a double bond — pyrrole-type nitrogens,
//! furan oxygens, thiophene sulfurs, all of which donate a lone pair instead
//! of a π electron — are pruned first; a perfect matching over the remainder
//! then decides where the double bonds go.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};

use crate::graph::{BondOrder, DirectedBond, MolecularGraph};
use crate::matching::find_perfect_matching;

/// Rewrites all aromatic bonds of `mol` into a Kekulé assignment. Returns
/// false (leaving the graph untouched) if no assignment exists.
pub(crate) fn kekulize(mol: &mut MolecularGraph) -> bool {
    if mol.is_kekulized() {
        return true;
    }

    let subgraph = mol.aromatic_subgraph().clone();
    let incident = mol.incident_bonds();

    let kept: Vec<usize> = subgraph
        .iter()
        .filter(|(v, neighbors)| {
            !neighbors.is_empty() && hosts_pi_bond(mol, &incident[**v], neighbors.len(), **v)
        })
        .map(|(v, _)| *v)
        .collect();

    let mut pi = UnGraph::<usize, ()>::new_undirected();
    let mut label: HashMap<usize, NodeIndex> = HashMap::with_capacity(kept.len());
    for &v in &kept {
        label.insert(v, pi.add_node(v));
    }
    for &v in &kept {
        for &w in &subgraph[&v] {
            if v < w {
                if let Some(&lw) = label.get(&w) {
                    pi.add_edge(label[&v], lw, ());
                }
            }
        }
    }

    let Some(matching) = find_perfect_matching(&pi) else {
        return false;
    };

    for (&v, neighbors) in &subgraph {
        for &w in neighbors {
            if v < w {
                mol.update_bond_order(v, w, BondOrder::Single);
            }
        }
        mol.clear_aromatic_flag(v);
    }

    for node in pi.node_indices() {
        let mate = matching[node.index()];
        if node.index() < mate.index() {
            mol.update_bond_order(pi[node], pi[mate], BondOrder::Double);
        }
    }

    mol.clear_aromatic_subgraph();
    true
}

/// Pruning test: can this atom carry exactly one double bond toward its
/// aromatic neighbors? Conservative — a vertex kept in error is caught by
/// the matching failing, never by wrong output.
fn hosts_pi_bond(
    mol: &MolecularGraph,
    incident: &[DirectedBond],
    aromatic_degree: usize,
    v: usize,
) -> bool {
    let atom = mol.atom(v);
    let Some(valences) = atom.element.aromatic_valences() else {
        return false;
    };

    let aromatic_degree = aromatic_degree as i16;
    let non_aromatic_sum: i16 = incident
        .iter()
        .filter(|bond| bond.order != BondOrder::Aromatic)
        .map(|bond| i16::from(bond.order.as_int()))
        .sum();

    let h_count = match atom.h_count {
        Some(h) => i16::from(h),
        None => implied_h(valences, aromatic_degree + non_aromatic_sum),
    };

    // room for one extra bond order on top of the σ framework
    let sigma = aromatic_degree + non_aromatic_sum + h_count;
    if !valences.iter().any(|&val| i16::from(val) >= sigma + 1) {
        return false;
    }

    // an unpaired π electron remains after σ bonds and hydrogens
    let electrons = i16::from(atom.element.valence_electrons()) - i16::from(atom.charge)
        - h_count
        - non_aromatic_sum
        - aromatic_degree;
    electrons >= 1 && electrons % 2 == 1
}

/// Hydrogen count a bare aromatic atom implies: fill up to the smallest
/// aromatic valence, leaving one slot for the π bond.
fn implied_h(valences: &[u8], connections: i16) -> i16 {
    let target = valences
        .iter()
        .map(|&v| i16::from(v))
        .find(|&v| v >= connections)
        .unwrap_or(0);
    let h = (target - connections).max(0);
    if h > 0 {
        h - 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn kekulized(smiles: &str) -> MolecularGraph {
        let mut mol = parse_smiles(smiles, false).unwrap();
        assert!(mol.kekulize(), "kekulization failed for {smiles}");
        mol
    }

    fn count_double_bonds(mol: &MolecularGraph) -> usize {
        (0..mol.atom_count())
            .flat_map(|i| mol.out_bonds(i))
            .filter(|bond| bond.order == BondOrder::Double && bond.src < bond.dst)
            .count()
    }

    fn assert_clean(mol: &MolecularGraph) {
        assert!(mol.is_kekulized());
        for i in 0..mol.atom_count() {
            assert!(!mol.atom(i).is_aromatic);
            assert!(!mol.exceeds_capacity(i), "atom {i} over capacity");
            for bond in mol.out_bonds(i) {
                assert_ne!(bond.order, BondOrder::Aromatic);
            }
        }
    }

    #[test]
    fn benzene() {
        let mol = kekulized("c1ccccc1");
        assert_eq!(mol.atom_count(), 6);
        assert_eq!(count_double_bonds(&mol), 3);
        assert_clean(&mol);
        // the deterministic matching alternates from the first ring atom
        assert_eq!(mol.get_dir_bond(0, 1).unwrap().order, BondOrder::Double);
        assert_eq!(mol.get_dir_bond(1, 2).unwrap().order, BondOrder::Single);
        assert_eq!(mol.get_dir_bond(5, 0).unwrap().order, BondOrder::Single);
    }

    #[test]
    fn pyridine() {
        let mol = kekulized("c1ccncc1");
        assert_eq!(count_double_bonds(&mol), 3);
        assert_clean(&mol);
    }

    #[test]
    fn pyrrole_nitrogen_stays_single() {
        let mol = kekulized("[nH]1cccc1");
        assert_eq!(count_double_bonds(&mol), 2);
        assert_clean(&mol);
        assert_eq!(mol.get_dir_bond(0, 1).unwrap().order, BondOrder::Single);
        assert_eq!(mol.get_dir_bond(4, 0).unwrap().order, BondOrder::Single);
    }

    #[test]
    fn furan() {
        let mol = kekulized("o1cccc1");
        assert_eq!(count_double_bonds(&mol), 2);
        assert_clean(&mol);
    }

    #[test]
    fn thiophene() {
        let mol = kekulized("s1cccc1");
        assert_eq!(count_double_bonds(&mol), 2);
        assert_clean(&mol);
        assert_eq!(mol.get_dir_bond(0, 1).unwrap().order, BondOrder::Single);
    }

    #[test]
    fn imidazole() {
        let mol = kekulized("c1c[nH]cn1");
        assert_eq!(count_double_bonds(&mol), 2);
        assert_clean(&mol);
    }

    #[test]
    fn naphthalene() {
        let mol = kekulized("c1ccc2ccccc2c1");
        assert_eq!(mol.atom_count(), 10);
        assert_eq!(count_double_bonds(&mol), 5);
        assert_clean(&mol);
    }

    #[test]
    fn pyridinium() {
        let mol = kekulized("[nH+]1ccccc1");
        assert_eq!(count_double_bonds(&mol), 3);
        assert_clean(&mol);
    }

    #[test]
    fn odd_ring_fails() {
        let mut mol = parse_smiles("c1cccc1", false).unwrap();
        assert!(!mol.kekulize());
        // failure leaves the aromatic system in place
        assert!(!mol.is_kekulized());
    }

    #[test]
    fn non_aromatic_passthrough() {
        let mut mol = parse_smiles("C=CC", false).unwrap();
        assert!(mol.kekulize());
        assert_eq!(mol.get_dir_bond(0, 1).unwrap().order, BondOrder::Double);
        assert_eq!(mol.get_dir_bond(1, 2).unwrap().order, BondOrder::Single);
    }

    #[test]
    fn exocyclic_substituent_stays_single() {
        let mol = kekulized("Cc1ccccc1");
        assert_eq!(mol.get_dir_bond(0, 1).unwrap().order, BondOrder::Single);
        assert_eq!(count_double_bonds(&mol), 3);
        assert_clean(&mol);
    }
}

//! Molecular graph → SMILES text.
//!
//! Walks each fragment from its root following the outgoing adjacency order,
//! so the output mirrors the order in which the graph was built. Ring bonds
//! become numbered closures; digits are returned to a pool once closed so
//! arbitrarily many rings stay within two-digit `%nn` closures.

use std::collections::{BTreeSet, HashMap};

use crate::graph::{
    Atom, AttributionMap, BondOrder, Chirality, DirectedBond, MolecularGraph, TokenAttribution,
};

pub(crate) fn write_smiles(graph: &MolecularGraph) -> String {
    write_tokens(graph)
        .into_iter()
        .map(|t| t.token)
        .collect()
}

pub(crate) fn write_smiles_attributed(graph: &MolecularGraph) -> (String, AttributionMap) {
    let tokens = write_tokens(graph);
    let smiles: String = tokens.iter().map(|t| t.token.as_str()).collect();
    (smiles, tokens)
}

struct DigitPool {
    free: BTreeSet<usize>,
    next: usize,
}

impl DigitPool {
    fn new() -> Self {
        Self { free: BTreeSet::new(), next: 1 }
    }

    fn take(&mut self) -> usize {
        match self.free.pop_first() {
            Some(digit) => digit,
            None => {
                let digit = self.next;
                self.next += 1;
                digit
            }
        }
    }

    fn give_back(&mut self, digit: usize) {
        self.free.insert(digit);
    }
}

fn digit_token(digit: usize) -> String {
    if digit <= 9 {
        digit.to_string()
    } else {
        format!("%{digit}")
    }
}

enum Step {
    Visit { atom: usize, incoming: Option<DirectedBond> },
    Literal(&'static str),
}

fn write_tokens(graph: &MolecularGraph) -> Vec<TokenAttribution> {
    let mut out: Vec<TokenAttribution> = Vec::new();
    let mut digits = DigitPool::new();
    let mut open_rings: HashMap<(usize, usize), usize> = HashMap::new();

    for (fragment, &root) in graph.roots().iter().enumerate() {
        if fragment > 0 {
            out.push(TokenAttribution { token: ".".to_owned(), attribution: Vec::new() });
        }

        let mut stack = vec![Step::Visit { atom: root, incoming: None }];
        while let Some(step) = stack.pop() {
            match step {
                Step::Literal(text) => {
                    out.push(TokenAttribution { token: text.to_owned(), attribution: Vec::new() });
                }
                Step::Visit { atom, incoming } => {
                    if let Some(bond) = incoming {
                        push_bond_token(graph, &bond, &mut out);
                    }

                    out.push(TokenAttribution {
                        token: atom_token(graph.atom(atom), written_chirality(graph, atom)),
                        attribution: graph.atom_attribution(atom).to_vec(),
                    });

                    for bond in graph.out_bonds(atom) {
                        if !bond.ring_bond {
                            continue;
                        }
                        let key = (bond.src.min(bond.dst), bond.src.max(bond.dst));
                        let digit = if bond.dst > bond.src {
                            let digit = digits.take();
                            open_rings.insert(key, digit);
                            digit
                        } else {
                            match open_rings.remove(&key) {
                                Some(digit) => {
                                    digits.give_back(digit);
                                    digit
                                }
                                None => digits.take(),
                            }
                        };
                        push_bond_token(graph, bond, &mut out);
                        out.push(TokenAttribution {
                            token: digit_token(digit),
                            attribution: graph.bond_attribution(bond.src, bond.dst).to_vec(),
                        });
                    }

                    let chain: Vec<&DirectedBond> =
                        graph.out_bonds(atom).iter().filter(|b| !b.ring_bond).collect();
                    let last = chain.len().saturating_sub(1);
                    for (i, bond) in chain.into_iter().enumerate().rev() {
                        if i < last {
                            stack.push(Step::Literal(")"));
                        }
                        stack.push(Step::Visit { atom: bond.dst, incoming: Some(*bond) });
                        if i < last {
                            stack.push(Step::Literal("("));
                        }
                    }
                }
            }
        }
    }

    out
}

fn push_bond_token(graph: &MolecularGraph, bond: &DirectedBond, out: &mut Vec<TokenAttribution>) {
    let token = match bond.order {
        BondOrder::Single => match bond.stereo {
            Some(stereo) => stereo.as_char().to_string(),
            None => return,
        },
        BondOrder::Double => "=".to_owned(),
        BondOrder::Triple => "#".to_owned(),
        // aromatic bonds are implicit between lowercase atoms
        BondOrder::Aromatic => return,
    };
    out.push(TokenAttribution {
        token,
        attribution: graph.bond_attribution(bond.src, bond.dst).to_vec(),
    });
}

/// Ring digits are printed directly after the atom even when the ring bonds
/// sit later in the adjacency list. Chirality reads neighbors in written
/// order, so an odd reordering must flip the marker.
fn written_chirality(graph: &MolecularGraph, idx: usize) -> Chirality {
    let atom = graph.atom(idx);
    if atom.chirality == Chirality::None || !graph.has_out_ring_bond(idx) {
        return atom.chirality;
    }
    let mut non_ring_seen = 0usize;
    let mut inversions = 0usize;
    for bond in graph.out_bonds(idx) {
        if bond.ring_bond {
            inversions += non_ring_seen;
        } else {
            non_ring_seen += 1;
        }
    }
    if inversions % 2 == 0 {
        atom.chirality
    } else {
        atom.chirality.flipped()
    }
}

fn atom_token(atom: &Atom, chirality: Chirality) -> String {
    let bare_ok = atom.element.is_organic_subset()
        && atom.isotope.is_none()
        && chirality == Chirality::None
        && atom.h_count.is_none()
        && atom.charge == 0;

    let symbol = |out: &mut String| {
        if atom.is_aromatic {
            for c in atom.element.symbol().chars() {
                out.push(c.to_ascii_lowercase());
            }
        } else {
            out.push_str(atom.element.symbol());
        }
    };

    let mut out = String::new();
    if bare_ok {
        symbol(&mut out);
        return out;
    }

    out.push('[');
    if let Some(isotope) = atom.isotope {
        out.push_str(&isotope.to_string());
    }
    symbol(&mut out);
    match chirality {
        Chirality::None => {}
        Chirality::Ccw => out.push('@'),
        Chirality::Cw => out.push_str("@@"),
    }
    if let Some(h) = atom.h_count {
        if h > 0 {
            out.push('H');
            if h > 1 {
                out.push_str(&h.to_string());
            }
        }
    }
    if atom.charge != 0 {
        out.push(if atom.charge > 0 { '+' } else { '-' });
        let magnitude = atom.charge.unsigned_abs();
        if magnitude > 1 {
            out.push_str(&magnitude.to_string());
        }
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::graph::BondStereo;

    fn atom(element: Element) -> Atom {
        Atom::new(element, false, None, Chirality::None, None, 0)
    }

    #[test]
    fn linear_chain() {
        let mut graph = MolecularGraph::new(false);
        let a = graph.add_atom(atom(Element::C), true);
        let b = graph.add_atom(atom(Element::C), false);
        let c = graph.add_atom(atom(Element::O), false);
        graph.add_bond(a, b, BondOrder::Single, None);
        graph.add_bond(b, c, BondOrder::Double, None);
        assert_eq!(write_smiles(&graph), "CC=O");
    }

    #[test]
    fn branch_parentheses() {
        let mut graph = MolecularGraph::new(false);
        let a = graph.add_atom(atom(Element::C), true);
        let b = graph.add_atom(atom(Element::F), false);
        let c = graph.add_atom(atom(Element::Cl), false);
        graph.add_bond(a, b, BondOrder::Single, None);
        graph.add_bond(a, c, BondOrder::Single, None);
        assert_eq!(write_smiles(&graph), "C(F)Cl");
    }

    #[test]
    fn ring_digits() {
        let mut graph = MolecularGraph::new(false);
        let atoms: Vec<usize> = (0..3)
            .map(|i| graph.add_atom(atom(Element::C), i == 0))
            .collect();
        graph.add_bond(atoms[0], atoms[1], BondOrder::Single, None);
        graph.add_bond(atoms[1], atoms[2], BondOrder::Single, None);
        graph.add_ring_bond(atoms[0], atoms[2], BondOrder::Single, None, None, None, None);
        assert_eq!(write_smiles(&graph), "C1CC1");
    }

    #[test]
    fn double_ring_bond_char_on_both_ends() {
        let mut graph = MolecularGraph::new(false);
        let atoms: Vec<usize> = (0..3)
            .map(|i| graph.add_atom(atom(Element::C), i == 0))
            .collect();
        graph.add_bond(atoms[0], atoms[1], BondOrder::Single, None);
        graph.add_bond(atoms[1], atoms[2], BondOrder::Single, None);
        graph.add_ring_bond(atoms[0], atoms[2], BondOrder::Double, None, None, None, None);
        assert_eq!(write_smiles(&graph), "C=1CC=1");
    }

    #[test]
    fn fragments_joined_with_dots() {
        let mut graph = MolecularGraph::new(false);
        graph.add_atom(Atom::new(Element::Na, false, None, Chirality::None, Some(0), 1), true);
        graph.add_atom(Atom::new(Element::Cl, false, None, Chirality::None, Some(0), -1), true);
        assert_eq!(write_smiles(&graph), "[Na+].[Cl-]");
    }

    #[test]
    fn bracket_atom_formats() {
        let token = |atom: Atom| {
            let chirality = atom.chirality;
            atom_token(&atom, chirality)
        };
        assert_eq!(
            token(Atom::new(Element::C, false, Some(13), Chirality::Cw, Some(1), 2)),
            "[13C@@H+2]"
        );
        assert_eq!(
            token(Atom::new(Element::N, false, None, Chirality::None, Some(3), 0)),
            "[NH3]"
        );
        assert_eq!(
            token(Atom::new(Element::O, false, None, Chirality::None, Some(0), -1)),
            "[O-]"
        );
        assert_eq!(
            token(Atom::new(Element::C, false, None, Chirality::None, None, 0)),
            "C"
        );
        assert_eq!(
            token(Atom::new(Element::Fe, false, None, Chirality::None, Some(0), 0)),
            "[Fe]"
        );
    }

    #[test]
    fn chirality_flips_when_ring_digit_precedes_other_bonds() {
        // stereocenter whose ring bond sits last in adjacency but whose
        // digit is written first
        let mut graph = MolecularGraph::new(false);
        let a = graph.add_atom(atom(Element::C), true);
        let b = graph.add_atom(
            Atom::new(Element::C, false, None, Chirality::Ccw, Some(1), 0),
            false,
        );
        let c = graph.add_atom(atom(Element::C), false);
        let d = graph.add_atom(atom(Element::C), false);
        graph.add_bond(a, b, BondOrder::Single, None);
        graph.add_bond(b, c, BondOrder::Single, None);
        graph.add_bond(c, d, BondOrder::Single, None);
        graph.add_ring_bond(b, d, BondOrder::Single, None, None, None, None);
        assert_eq!(write_smiles(&graph), "C[C@@H]1CC1");
    }

    #[test]
    fn stereo_bond_chars() {
        let mut graph = MolecularGraph::new(false);
        let f1 = graph.add_atom(atom(Element::F), true);
        let c1 = graph.add_atom(atom(Element::C), false);
        let c2 = graph.add_atom(atom(Element::C), false);
        let f2 = graph.add_atom(atom(Element::F), false);
        graph.add_bond(f1, c1, BondOrder::Single, Some(BondStereo::Up));
        graph.add_bond(c1, c2, BondOrder::Double, None);
        graph.add_bond(c2, f2, BondOrder::Single, Some(BondStereo::Down));
        assert_eq!(write_smiles(&graph), "F/C=C\\F");
    }
}

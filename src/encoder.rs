//! SMILES → SELFIES.
//!
//! The emitted SELFIES mirrors a depth-first traversal of the parsed graph in
//! adjacency order. At each atom the last non-ring outgoing bond continues
//! the main chain and every earlier one becomes a branch whose index tail
//! encodes the branch's symbol count. Ring bonds are emitted at their
//! higher-indexed endpoint with an index tail encoding the span back to the
//! opening atom.

use std::fmt;

use crate::element::Element;
use crate::grammar;
use crate::graph::{
    AttributionMap, BondOrder, BondStereo, Chirality, DirectedBond, MolecularGraph,
    TokenAttribution,
};
use crate::smiles::{self, SmilesError};

#[derive(Debug, Clone, PartialEq)]
pub enum EncoderError {
    Smiles { smiles: String, error: SmilesError },
    Kekulization { smiles: String },
    CapacityExceeded { smiles: String, index: usize, element: Element },
    IndexOverflow { smiles: String },
}

impl fmt::Display for EncoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smiles { smiles, error } => {
                write!(f, "cannot parse SMILES {:?}: {}", smiles, error)
            }
            Self::Kekulization { smiles } => {
                write!(f, "aromatic system in {:?} cannot be kekulized", smiles)
            }
            Self::CapacityExceeded { smiles, index, element } => write!(
                f,
                "atom {} ({}) in {:?} exceeds its bonding capacity",
                index,
                element.symbol(),
                smiles
            ),
            Self::IndexOverflow { smiles } => write!(
                f,
                "branch or ring span in {:?} exceeds the index alphabet range",
                smiles
            ),
        }
    }
}

impl std::error::Error for EncoderError {}

/// Translates a SMILES string into SELFIES.
pub fn encoder(smiles_str: &str) -> Result<String, EncoderError> {
    let tokens = encode(smiles_str, false)?;
    Ok(tokens.into_iter().map(|t| t.token).collect())
}

/// Like [`encoder`], also reporting which input atoms produced each output
/// symbol.
pub fn encoder_with_attribution(
    smiles_str: &str,
) -> Result<(String, AttributionMap), EncoderError> {
    let tokens = encode(smiles_str, true)?;
    let selfies: String = tokens.iter().map(|t| t.token.as_str()).collect();
    Ok((selfies, tokens))
}

fn encode(input: &str, attribute: bool) -> Result<Vec<TokenAttribution>, EncoderError> {
    let mut graph = smiles::parse_smiles(input, attribute).map_err(|error| {
        EncoderError::Smiles { smiles: input.to_owned(), error }
    })?;

    if !graph.kekulize() {
        return Err(EncoderError::Kekulization { smiles: input.to_owned() });
    }

    for idx in 0..graph.atom_count() {
        if graph.exceeds_capacity(idx) {
            return Err(EncoderError::CapacityExceeded {
                smiles: input.to_owned(),
                index: idx,
                element: graph.atom(idx).element,
            });
        }
    }

    let mut out = Vec::new();
    for (fragment, &root) in graph.roots().iter().enumerate() {
        if fragment > 0 {
            out.push(TokenAttribution { token: ".".to_owned(), attribution: Vec::new() });
        }
        emit_chain(&graph, root, None, &mut out)
            .map_err(|_| EncoderError::IndexOverflow { smiles: input.to_owned() })?;
    }
    Ok(out)
}

/// Marker for spans too long for the three-symbol index tail.
struct IndexOverflow;

fn emit_chain(
    graph: &MolecularGraph,
    start: usize,
    start_bond: Option<&DirectedBond>,
    out: &mut Vec<TokenAttribution>,
) -> Result<(), IndexOverflow> {
    let mut atom = start;
    let mut incoming = start_bond.copied();

    loop {
        out.push(atom_token(graph, atom, incoming.as_ref()));

        for bond in graph.out_bonds(atom) {
            if bond.ring_bond && bond.dst < bond.src {
                emit_ring(graph, bond, out)?;
            }
        }

        let chain: Vec<&DirectedBond> =
            graph.out_bonds(atom).iter().filter(|b| !b.ring_bond).collect();
        let Some((&last, branches)) = chain.split_last() else {
            return Ok(());
        };

        for &bond in branches {
            let mut body = Vec::new();
            emit_chain(graph, bond.dst, Some(bond), &mut body)?;
            let tail = grammar::symbols_from_index(body.len() - 1);
            if tail.len() > 3 {
                return Err(IndexOverflow);
            }
            let attribution = body
                .first()
                .map(|t| t.attribution.clone())
                .unwrap_or_default();
            out.push(TokenAttribution {
                token: format!("[{}Branch{}]", order_prefix(bond.order), tail.len()),
                attribution: attribution.clone(),
            });
            for symbol in tail {
                out.push(TokenAttribution {
                    token: symbol.to_owned(),
                    attribution: attribution.clone(),
                });
            }
            out.append(&mut body);
        }

        // "last bond wins": the final outgoing bond continues the chain
        atom = last.dst;
        incoming = Some(*last);
    }
}

fn emit_ring(
    graph: &MolecularGraph,
    bond: &DirectedBond,
    out: &mut Vec<TokenAttribution>,
) -> Result<(), IndexOverflow> {
    let tail = grammar::symbols_from_index(bond.src - bond.dst - 1);
    if tail.len() > 3 {
        return Err(IndexOverflow);
    }

    let left_stereo = graph
        .get_dir_bond(bond.dst, bond.src)
        .and_then(|b| b.stereo);
    let right_stereo = bond.stereo;

    let token = match bond.order {
        BondOrder::Double => format!("[=Ring{}]", tail.len()),
        BondOrder::Triple => format!("[#Ring{}]", tail.len()),
        _ if left_stereo.is_some() || right_stereo.is_some() => format!(
            "[{}{}Ring{}]",
            stereo_char(left_stereo),
            stereo_char(right_stereo),
            tail.len()
        ),
        _ => format!("[Ring{}]", tail.len()),
    };

    let mut attribution = graph.atom_attribution(bond.dst).to_vec();
    attribution.extend_from_slice(graph.atom_attribution(bond.src));

    out.push(TokenAttribution { token, attribution: attribution.clone() });
    for symbol in tail {
        out.push(TokenAttribution {
            token: symbol.to_owned(),
            attribution: attribution.clone(),
        });
    }
    Ok(())
}

fn order_prefix(order: BondOrder) -> &'static str {
    match order {
        BondOrder::Double => "=",
        BondOrder::Triple => "#",
        BondOrder::Single | BondOrder::Aromatic => "",
    }
}

fn stereo_char(stereo: Option<BondStereo>) -> char {
    match stereo {
        Some(s) => s.as_char(),
        None => '-',
    }
}

fn atom_token(
    graph: &MolecularGraph,
    idx: usize,
    incoming: Option<&DirectedBond>,
) -> TokenAttribution {
    let atom = graph.atom(idx);

    let mut token = String::from("[");
    match incoming.map(|b| (b.order, b.stereo)) {
        None | Some((BondOrder::Single, None)) | Some((BondOrder::Aromatic, _)) => {}
        Some((BondOrder::Single, Some(stereo))) => token.push(stereo.as_char()),
        Some((BondOrder::Double, _)) => token.push('='),
        Some((BondOrder::Triple, _)) => token.push('#'),
    }

    if let Some(isotope) = atom.isotope {
        token.push_str(&isotope.to_string());
    }
    token.push_str(atom.element.symbol());
    match effective_chirality(graph, idx) {
        Chirality::None => {}
        Chirality::Ccw => token.push('@'),
        Chirality::Cw => token.push_str("@@"),
    }
    if let Some(h) = atom.h_count {
        token.push('H');
        token.push_str(&h.to_string());
    }
    if atom.charge != 0 {
        token.push(if atom.charge > 0 { '+' } else { '-' });
        token.push_str(&atom.charge.unsigned_abs().to_string());
    }
    token.push(']');

    TokenAttribution { token, attribution: graph.atom_attribution(idx).to_vec() }
}

/// SELFIES regenerates an atom's ring bonds in a different adjacency order
/// than SMILES wrote them: closures first, then openings sorted by partner,
/// then the ordinary bonds. If that reordering is an odd permutation the
/// chirality marker must flip to describe the same center.
fn effective_chirality(graph: &MolecularGraph, idx: usize) -> Chirality {
    let atom = graph.atom(idx);
    if atom.chirality == Chirality::None || !graph.has_out_ring_bond(idx) {
        return atom.chirality;
    }

    let bonds = graph.out_bonds(idx);
    let from: Vec<usize> = bonds.iter().map(|b| b.dst).collect();

    let closes = bonds
        .iter()
        .filter(|b| b.ring_bond && b.dst < b.src)
        .map(|b| b.dst);
    let mut opens: Vec<usize> = bonds
        .iter()
        .filter(|b| b.ring_bond && b.dst > b.src)
        .map(|b| b.dst)
        .collect();
    opens.sort_unstable();
    let rest = bonds.iter().filter(|b| !b.ring_bond).map(|b| b.dst);
    let to: Vec<usize> = closes.chain(opens).chain(rest).collect();

    if permutation_is_even(&from, &to) {
        atom.chirality
    } else {
        atom.chirality.flipped()
    }
}

fn permutation_is_even(from: &[usize], to: &[usize]) -> bool {
    let n = from.len();
    if n != to.len() {
        return true;
    }
    let perm: Vec<usize> = from
        .iter()
        .map(|f| to.iter().position(|t| t == f).unwrap_or(0))
        .collect();
    let mut visited = vec![false; n];
    let mut swaps = 0;
    for i in 0..n {
        if visited[i] {
            continue;
        }
        let mut cycle_len = 0;
        let mut j = i;
        while !visited[j] {
            visited[j] = true;
            j = perm[j];
            cycle_len += 1;
        }
        swaps += cycle_len - 1;
    }
    swaps % 2 == 0
}

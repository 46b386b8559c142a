//! SELFIES → SMILES derivation engine.
//!
//! Symbols are consumed from a forward-only stream shared between the main
//! derivation and its recursive branch frames; a branch consumes from its
//! parent's stream up to a sub-budget decided by the index symbols that
//! follow the branch symbol. Bond orders are clamped against the remaining
//! capacity of the current atom, and once a chain saturates further atoms
//! are accepted as new fragment roots, so any sequence of grammar symbols
//! derives a valid molecular graph. Only structurally impossible input — a
//! hanging bracket, or a symbol outside the grammar at a derivation
//! position — is an error.

use std::fmt;

use crate::grammar::{self, ParsedSymbol};
use crate::graph::{Attribution, AttributionMap, BondOrder, BondStereo, MolecularGraph};
use crate::smiles;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    MalformedBracket { input: String, pos: usize },
    UnknownSymbol { input: String, symbol: String },
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedBracket { input, pos } => {
                write!(f, "malformed bracket at position {} in {:?}", pos, input)
            }
            Self::UnknownSymbol { input, symbol } => {
                write!(f, "invalid symbol '{}' in {:?}", symbol, input)
            }
        }
    }
}

impl std::error::Error for DecoderError {}

/// Translates a SELFIES string into SMILES.
///
/// Total over grammar symbols: bond orders are clamped rather than rejected,
/// unformable ring bonds are skipped, atoms past a saturated chain start new
/// fragments, and input with no symbols at all decodes to `"C"`.
pub fn decoder(selfies: &str) -> Result<String, DecoderError> {
    let graph = decode_to_graph(selfies, false)?;
    if graph.is_empty() {
        return Ok("C".to_owned());
    }
    Ok(smiles::write_smiles(&graph))
}

/// Like [`decoder`], also reporting which input symbols produced each output
/// token.
pub fn decoder_with_attribution(
    selfies: &str,
) -> Result<(String, AttributionMap), DecoderError> {
    let graph = decode_to_graph(selfies, true)?;
    if graph.is_empty() {
        return Ok(("C".to_owned(), Vec::new()));
    }
    Ok(smiles::write_smiles_attributed(&graph))
}

pub(crate) fn decode_to_graph(
    selfies: &str,
    attribute: bool,
) -> Result<MolecularGraph, DecoderError> {
    let fragments = tokenize(selfies)?;
    let mut graph = MolecularGraph::new(attribute);
    let mut rings: Vec<RingEntry> = Vec::new();
    let mut attr_stack: Vec<Attribution> = Vec::new();

    for fragment in &fragments {
        let mut stream = SymbolStream { tokens: fragment.as_slice(), pos: 0 };
        derive_fragment(
            &mut stream,
            &mut graph,
            &mut rings,
            None,
            Some(0),
            None,
            &mut attr_stack,
            selfies,
        )?;
    }

    resolve_rings(&mut graph, &rings);
    Ok(graph)
}

struct Token<'a> {
    /// position in the symbol sequence, `.` separators included
    index: usize,
    text: &'a str,
}

/// Splits the input into per-fragment token lists. `[nop]` symbols are
/// dropped here, which is what makes them no-ops at every position —
/// including inside index tails and branch budgets.
fn tokenize(selfies: &str) -> Result<Vec<Vec<Token<'_>>>, DecoderError> {
    let mut fragments: Vec<Vec<Token>> = vec![Vec::new()];
    let mut symbol_index = 0;
    let mut rest = selfies;
    let mut offset = 0;

    while let Some(found) = rest.find(['[', '.']) {
        let pos = offset + found;
        if rest.as_bytes()[found] == b'.' {
            fragments.push(Vec::new());
            symbol_index += 1;
            rest = &rest[found + 1..];
            offset = pos + 1;
            continue;
        }
        let Some(end) = rest[found..].find(']') else {
            return Err(DecoderError::MalformedBracket { input: selfies.to_owned(), pos });
        };
        let text = &rest[found..found + end + 1];
        if text != "[nop]" {
            if let Some(last) = fragments.last_mut() {
                last.push(Token { index: symbol_index, text });
            }
        }
        symbol_index += 1;
        rest = &rest[found + end + 1..];
        offset = pos + end + 1;
    }

    Ok(fragments)
}

/// Forward-only cursor over a fragment's tokens, shared by reference with
/// recursive branch frames.
struct SymbolStream<'a, 'b> {
    tokens: &'b [Token<'a>],
    pos: usize,
}

impl<'a, 'b> SymbolStream<'a, 'b> {
    fn next(&mut self) -> Option<&'b Token<'a>> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }
}

struct RingEntry {
    left: usize,
    right: usize,
    order: u8,
    stereo: (Option<BondStereo>, Option<BondStereo>),
    attribution: Vec<Attribution>,
}

/// Reads up to `count` symbols as an index numeral. Returns the decoded
/// value and how many symbols were actually consumed.
fn read_index(stream: &mut SymbolStream, count: usize) -> (usize, usize) {
    let mut symbols: Vec<&str> = Vec::with_capacity(count);
    for _ in 0..count {
        match stream.next() {
            Some(token) => symbols.push(token.text),
            None => break,
        }
    }
    (grammar::index_from_symbols(&symbols), symbols.len())
}

/// One derivation frame. `state` is the number of bonds the current atom can
/// still accept; `None` means saturated. Saturation does not end the frame:
/// derivation keeps consuming until its budget or the stream runs out, with
/// atoms becoming fresh fragment roots and branch and ring symbols reduced
/// to consuming their index tails. Returns the number of symbols consumed.
#[allow(clippy::too_many_arguments)]
fn derive_fragment(
    stream: &mut SymbolStream,
    graph: &mut MolecularGraph,
    rings: &mut Vec<RingEntry>,
    max_derive: Option<usize>,
    init_state: Option<u8>,
    root_atom: Option<usize>,
    attr_stack: &mut Vec<Attribution>,
    input: &str,
) -> Result<usize, DecoderError> {
    let mut n_derived = 0usize;
    let mut state = init_state;
    let mut prev = root_atom;
    let track = graph.tracks_attribution();

    loop {
        if max_derive.is_some_and(|budget| n_derived >= budget) {
            break;
        }
        let Some(token) = stream.next() else { break };
        n_derived += 1;
        let bonds_left = state.unwrap_or(0);

        let Some(symbol) = grammar::parse_symbol(token.text) else {
            return Err(DecoderError::UnknownSymbol {
                input: input.to_owned(),
                symbol: token.text.to_owned(),
            });
        };

        match symbol {
            ParsedSymbol::Epsilon => {
                state = if bonds_left == 0 { state } else { None };
            }

            ParsedSymbol::Branch { order, index_len } => {
                if bonds_left <= 1 {
                    // inactive branch: the index symbols are consumed anyway
                    let (_, read) = read_index(stream, index_len);
                    n_derived += read;
                } else {
                    let (q, read) = read_index(stream, index_len);
                    n_derived += read;
                    let branch_init = order.min(bonds_left - 1);
                    if track {
                        attr_stack.push(Attribution {
                            index: token.index,
                            token: token.text.to_owned(),
                        });
                    }
                    let consumed = derive_fragment(
                        stream,
                        graph,
                        rings,
                        Some(q + 1),
                        Some(branch_init),
                        prev,
                        attr_stack,
                        input,
                    )?;
                    if track {
                        attr_stack.pop();
                    }
                    n_derived += consumed;
                    state = Some(bonds_left - branch_init);
                }
            }

            ParsedSymbol::Ring { order, index_len, stereo } => {
                if bonds_left == 0 {
                    let (_, read) = read_index(stream, index_len);
                    n_derived += read;
                } else {
                    let (q, read) = read_index(stream, index_len);
                    n_derived += read;
                    if let Some(right) = prev {
                        let ring_order = order.min(bonds_left);
                        let left = right.saturating_sub(q + 1);
                        let mut attribution = Vec::new();
                        if track {
                            attribution.clone_from(attr_stack);
                            attribution.push(Attribution {
                                index: token.index,
                                token: token.text.to_owned(),
                            });
                        }
                        rings.push(RingEntry {
                            left,
                            right,
                            order: ring_order,
                            stereo,
                            attribution,
                        });
                        let left_over = bonds_left - ring_order;
                        state = if left_over == 0 { None } else { Some(left_over) };
                    }
                }
            }

            ParsedSymbol::Atom { order, stereo, atom } => {
                let capacity = atom.bonding_capacity();
                let bond_order = order.min(bonds_left).min(capacity);
                let mut attribution = Vec::new();
                if track {
                    attribution.clone_from(attr_stack);
                    attribution.push(Attribution {
                        index: token.index,
                        token: token.text.to_owned(),
                    });
                }

                let idx = if bond_order == 0 {
                    // saturated or zero-capacity: the atom starts a new root
                    graph.add_atom(atom, true)
                } else {
                    let idx = graph.add_atom(atom, false);
                    if let Some(p) = prev {
                        graph.add_bond(p, idx, BondOrder::from_int(bond_order), stereo);
                        if track {
                            graph.attribute_bond(p, idx, attribution.clone());
                        }
                    }
                    idx
                };
                if track {
                    graph.attribute_atom(idx, attribution);
                }
                prev = Some(idx);
                let left_over = capacity - bond_order;
                state = if left_over == 0 { None } else { Some(left_over) };
            }
        }
    }

    Ok(n_derived)
}

/// Forms the deferred ring bonds after all fragments have derived. Each pair
/// is handled independently: orders clamp to the remaining capacity of both
/// endpoints, duplicate pairs pile onto the existing bond (capped at triple),
/// and unformable rings are skipped.
fn resolve_rings(graph: &mut MolecularGraph, rings: &[RingEntry]) {
    for ring in rings {
        let (a, b) = (ring.left, ring.right);
        if a == b {
            continue;
        }
        let free_a = graph.free_bonds(a);
        let free_b = graph.free_bonds(b);
        if free_a == 0 || free_b == 0 {
            continue;
        }
        let order = ring.order.min(free_a).min(free_b);

        if graph.has_bond(a, b) {
            if let Some(existing) = graph.get_dir_bond(a, b) {
                let merged = (existing.order.as_int() + order).min(3);
                graph.update_bond_order(a, b, BondOrder::from_int(merged));
            }
        } else {
            graph.add_ring_bond(
                a,
                b,
                BondOrder::from_int(order),
                ring.stereo.0,
                ring.stereo.1,
                None,
                None,
            );
            if !ring.attribution.is_empty() {
                graph.attribute_bond(a, b, ring.attribution.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(s: &str) -> String {
        decoder(s).unwrap()
    }

    #[test]
    fn simple_chains() {
        assert_eq!(decode("[C]"), "C");
        assert_eq!(decode("[C][C]"), "CC");
        assert_eq!(decode("[C][O][C]"), "COC");
        assert_eq!(decode("[C][=C]"), "C=C");
        assert_eq!(decode("[C][#C]"), "C#C");
    }

    #[test]
    fn benzene() {
        assert_eq!(
            decode("[C][=C][C][=C][C][=C][Ring1][=Branch1]"),
            "C1=CC=CC=C1"
        );
    }

    #[test]
    fn cyclohexane() {
        assert_eq!(decode("[C][C][C][C][C][C][Ring1][=Branch1]"), "C1CCCCC1");
    }

    #[test]
    fn branch() {
        assert_eq!(decode("[C][C][Branch1][C][F][C]"), "CC(F)C");
        assert_eq!(decode("[C][C][=Branch1][C][=O][O]"), "CC(=O)O");
    }

    #[test]
    fn branch_longer_than_one() {
        // [Ring1] as index symbol encodes 1, so the branch spans two symbols
        assert_eq!(decode("[C][C][Branch1][Ring1][O][C][C]"), "CC(OC)C");
    }

    #[test]
    fn nested_branches() {
        assert_eq!(decode("[C][C][Branch1][C][C][Branch1][C][C][C]"), "CC(C)(C)C");
    }

    #[test]
    fn bond_orders_clamp_to_capacity() {
        // triple bond clamped to fluorine's single slot
        assert_eq!(decode("[C][#F]"), "CF");
        // and against the two bonds left on the doubly bonded carbon
        assert_eq!(decode("[C][=C][#C]"), "C=C=C");
    }

    #[test]
    fn saturated_chain_continues_as_new_root() {
        assert_eq!(decode("[F][F][F]"), "FF.F");
        assert_eq!(decode("[F][F][F][F]"), "FF.FF");
    }

    #[test]
    fn zero_capacity_atom_starts_new_root() {
        assert_eq!(decode("[C][C][CH4]"), "CC.[CH4]");
    }

    #[test]
    fn epsilon_stops_bonding() {
        // no bond reaches the atoms after [epsilon]; they start fresh roots
        assert_eq!(decode("[C][epsilon][C]"), "C.C");
        assert_eq!(decode("[C][C][epsilon][O]"), "CC.O");
    }

    #[test]
    fn nop_is_invisible_everywhere() {
        let plain = decode("[C][C][Branch1][C][F][C]");
        assert_eq!(decode("[nop][C][C][Branch1][C][F][C]"), plain);
        assert_eq!(decode("[C][C][Branch1][nop][C][F][C]"), plain);
        assert_eq!(decode("[C][C][Branch1][C][nop][F][C]"), plain);
        assert_eq!(decode("[C][C][Branch1][C][F][C][nop]"), plain);
        assert_eq!(decode("[nop]"), "C");
    }

    #[test]
    fn ring_on_existing_bond_raises_order() {
        assert_eq!(decode("[C][C][Ring1][C]"), "C=C");
        assert_eq!(decode("[C][=C][Ring1][C]"), "C#C");
        // capped at triple
        assert_eq!(decode("[C][#C][Ring1][C]"), "C#C");
    }

    #[test]
    fn ring_without_capacity_is_skipped() {
        // the ring targets the saturated fluorine and is dropped
        assert_eq!(decode("[F][C][C][C][Ring1][Ring2]"), "FCCC");
    }

    #[test]
    fn ring_offset_clamps_to_first_atom() {
        assert_eq!(decode("[C][C][C][Ring2][S][P]"), "C1CC1");
    }

    #[test]
    fn double_ring_symbol() {
        assert_eq!(decode("[C][C][C][C][=Ring1][Ring2]"), "C=1CCC=1");
    }

    #[test]
    fn fragments() {
        assert_eq!(decode("[C].[C]"), "C.C");
        assert_eq!(decode("[Na+1].[Cl-1]"), "[Na+].[Cl-]");
    }

    #[test]
    fn ring_across_fragments() {
        assert_eq!(decode("[C].[C][Ring1][C]"), "C1.C1");
    }

    #[test]
    fn charged_and_decorated_atoms() {
        assert_eq!(decode("[NH4+1]"), "[NH4+]");
        assert_eq!(decode("[13C]"), "[13C]");
        assert_eq!(decode("[C][O-1]"), "C[O-]");
        assert_eq!(decode("[CH0]"), "[C]");
    }

    #[test]
    fn stereo_bonds_pass_through() {
        assert_eq!(decode("[F][/C][=C][/F]"), "F/C=C/F");
        assert_eq!(decode("[F][/C][=C][\\F]"), "F/C=C\\F");
    }

    #[test]
    fn empty_inputs_decode_to_methane() {
        assert_eq!(decode(""), "C");
        assert_eq!(decode("   "), "C");
        assert_eq!(decode("."), "C");
    }

    #[test]
    fn malformed_bracket_is_an_error() {
        assert!(matches!(
            decoder("[O][=C][O][C][C][C][C][O][N][Branch2_3"),
            Err(DecoderError::MalformedBracket { .. })
        ));
        assert!(matches!(
            decoder("[C]["),
            Err(DecoderError::MalformedBracket { .. })
        ));
    }

    #[test]
    fn unknown_symbol_at_derivation_position() {
        assert!(matches!(
            decoder("[C][Xyz]"),
            Err(DecoderError::UnknownSymbol { .. })
        ));
        assert!(matches!(
            decoder("[Branch2_3][C]"),
            Err(DecoderError::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn unknown_symbol_at_index_position_reads_as_zero() {
        // [Xyz] would be an error at a derivation position, but here it is
        // an index digit worth zero
        assert_eq!(decode("[C][C][C][Branch1][Xyz][F][C]"), "CCC(F)C");
    }

    #[test]
    fn branch_with_insufficient_state_is_skipped() {
        // one bond left on the oxygen: the branch symbol and its index
        // symbol are consumed without producing a branch, the fluorine takes
        // the last bond, and the trailing carbon becomes a new root
        assert_eq!(decode("[C][O][Branch1][C][F][C]"), "COF.C");
    }

    #[test]
    fn branch_consumes_its_whole_budget() {
        // [Ring2] encodes 2, so the branch owns the next three symbols; the
        // fluorine saturates immediately and the remaining two carbons
        // derive inside the branch as a disconnected chain, not as
        // continuation of the parent
        assert_eq!(decode("[C][C][Branch1][Ring2][F][C][C]"), "CCF.CC");
    }

    #[test]
    fn attribution_tracks_branch_stack() {
        let (smiles, map) =
            decoder_with_attribution("[C][N][C][Branch1][C][P][C][C][Ring1][=Branch1]").unwrap();
        assert!(smiles.contains('P'));
        let p_token = map
            .iter()
            .find(|t| t.token == "[P]" || t.token == "P")
            .expect("phosphorus token in output");
        assert!(p_token.attribution.iter().any(|a| a.token == "[P]"));
        assert!(p_token.attribution.iter().any(|a| a.token == "[Branch1]"));
    }

    #[test]
    fn decoded_graphs_respect_capacity() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let alphabet: Vec<String> =
            crate::constraints::get_semantic_robust_alphabet().into_iter().collect();
        let mut rng = StdRng::seed_from_u64(0x5e1f1e5);
        for _ in 0..200 {
            let len = rng.gen_range(1..40);
            let selfies: String = (0..len)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())].clone())
                .collect();
            let graph = decode_to_graph(&selfies, false)
                .unwrap_or_else(|e| panic!("decode failed for {selfies}: {e}"));
            for i in 0..graph.atom_count() {
                assert!(!graph.exceeds_capacity(i), "over capacity in {selfies}");
            }
        }
    }
}

//! SMILES → molecular graph, in a single descent over the input.
//!
//! Bonds land in the graph in text order, which fixes the adjacency order
//! the SELFIES encoder will traverse. A ring-opening digit reserves a slot
//! in its atom's adjacency list so the eventual ring bond sits where the
//! digit appeared, not where the ring closed.

use std::collections::HashMap;

use crate::element::Element;
use crate::graph::{Atom, Attribution, BondOrder, BondStereo, Chirality, MolecularGraph};
use crate::smiles::error::SmilesError;

struct PendingBond {
    order: u8,
    stereo: Option<BondStereo>,
}

struct RingOpen {
    atom: usize,
    order: Option<u8>,
    stereo: Option<BondStereo>,
    /// adjacency slot reserved at the opening digit
    slot: usize,
}

pub(crate) fn parse_smiles(
    input: &str,
    attribute: bool,
) -> Result<MolecularGraph, SmilesError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SmilesError::EmptyInput);
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut graph = MolecularGraph::new(attribute);
    let mut prev: Option<usize> = None;
    let mut branch_stack: Vec<usize> = Vec::new();
    let mut pending: Option<PendingBond> = None;
    let mut ring_opens: HashMap<u16, RingOpen> = HashMap::new();

    let mut i = 0;
    while i < chars.len() {
        let pos = i;
        match chars[i] {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '-' => {
                pending = Some(PendingBond { order: 1, stereo: None });
                i += 1;
            }
            '=' => {
                pending = Some(PendingBond { order: 2, stereo: None });
                i += 1;
            }
            '#' => {
                pending = Some(PendingBond { order: 3, stereo: None });
                i += 1;
            }
            '/' => {
                pending = Some(PendingBond { order: 1, stereo: Some(BondStereo::Up) });
                i += 1;
            }
            '\\' => {
                pending = Some(PendingBond { order: 1, stereo: Some(BondStereo::Down) });
                i += 1;
            }
            '$' => {
                return Err(SmilesError::UnsupportedFeature { pos, feature: "quadruple bond" });
            }
            ':' => {
                return Err(SmilesError::UnsupportedFeature { pos, feature: "aromatic bond char" });
            }
            '*' => {
                return Err(SmilesError::UnsupportedFeature { pos, feature: "wildcard atom" });
            }
            '(' => {
                let cur = prev.ok_or(SmilesError::UnmatchedParen { pos })?;
                branch_stack.push(cur);
                i += 1;
            }
            ')' => {
                prev = Some(branch_stack.pop().ok_or(SmilesError::UnmatchedParen { pos })?);
                pending = None;
                i += 1;
            }
            '.' => {
                prev = None;
                pending = None;
                i += 1;
            }
            d @ '0'..='9' => {
                let digit = (d as u16) - ('0' as u16);
                close_or_open_ring(
                    &mut graph,
                    &mut ring_opens,
                    digit,
                    pos,
                    prev,
                    pending.take(),
                )?;
                i += 1;
            }
            '%' => {
                if i + 2 >= chars.len()
                    || !chars[i + 1].is_ascii_digit()
                    || !chars[i + 2].is_ascii_digit()
                {
                    return Err(SmilesError::UnexpectedChar { pos, ch: '%' });
                }
                let digit = ((chars[i + 1] as u16) - ('0' as u16)) * 10
                    + (chars[i + 2] as u16)
                    - ('0' as u16);
                close_or_open_ring(
                    &mut graph,
                    &mut ring_opens,
                    digit,
                    pos,
                    prev,
                    pending.take(),
                )?;
                i += 3;
            }
            '[' => {
                let (atom, next) = parse_bracket_atom(&chars, i)?;
                let token: String = chars[i..next].iter().collect();
                prev = Some(insert_atom(&mut graph, atom, prev, pending.take(), &token, attribute));
                i = next;
            }
            _ => {
                let (atom, next) = parse_bare_atom(&chars, i)?;
                let token: String = chars[i..next].iter().collect();
                prev = Some(insert_atom(&mut graph, atom, prev, pending.take(), &token, attribute));
                i = next;
            }
        }
    }

    if !branch_stack.is_empty() {
        return Err(SmilesError::UnmatchedParen { pos: chars.len() });
    }
    if let Some((&digit, _)) = ring_opens.iter().next() {
        return Err(SmilesError::UnclosedRing { digit });
    }

    Ok(graph)
}

fn insert_atom(
    graph: &mut MolecularGraph,
    atom: Atom,
    prev: Option<usize>,
    pending: Option<PendingBond>,
    token: &str,
    attribute: bool,
) -> usize {
    let aromatic = atom.is_aromatic;
    let idx = graph.add_atom(atom, prev.is_none());
    if attribute {
        graph.attribute_atom(idx, vec![Attribution { index: idx, token: token.to_owned() }]);
    }
    if let Some(p) = prev {
        let (order, stereo) = match pending {
            Some(bond) => (BondOrder::from_int(bond.order), bond.stereo),
            None => {
                if aromatic && graph.atom(p).is_aromatic {
                    (BondOrder::Aromatic, None)
                } else {
                    (BondOrder::Single, None)
                }
            }
        };
        graph.add_bond(p, idx, order, stereo);
    }
    idx
}

fn close_or_open_ring(
    graph: &mut MolecularGraph,
    ring_opens: &mut HashMap<u16, RingOpen>,
    digit: u16,
    pos: usize,
    prev: Option<usize>,
    pending: Option<PendingBond>,
) -> Result<(), SmilesError> {
    let cur = prev.ok_or(SmilesError::InvalidRingBond { digit, pos })?;
    let (order, stereo) = match pending {
        Some(bond) => (Some(bond.order), bond.stereo),
        None => (None, None),
    };

    match ring_opens.remove(&digit) {
        None => {
            ring_opens.insert(
                digit,
                RingOpen {
                    atom: cur,
                    order,
                    stereo,
                    slot: graph.out_bonds(cur).len(),
                },
            );
            Ok(())
        }
        Some(open) => {
            if open.atom == cur || graph.has_bond(open.atom, cur) {
                return Err(SmilesError::InvalidRingBond { digit, pos });
            }
            let merged = open.order.unwrap_or(1).max(order.unwrap_or(1));
            let both_aromatic =
                graph.atom(open.atom).is_aromatic && graph.atom(cur).is_aromatic;
            let bond_order = if merged == 1 && both_aromatic {
                BondOrder::Aromatic
            } else {
                BondOrder::from_int(merged)
            };
            graph.add_ring_bond(
                open.atom,
                cur,
                bond_order,
                open.stereo,
                stereo,
                Some(open.slot),
                None,
            );
            Ok(())
        }
    }
}

fn parse_bare_atom(chars: &[char], start: usize) -> Result<(Atom, usize), SmilesError> {
    let make = |element, aromatic, len| {
        Ok((
            Atom::new(element, aromatic, None, Chirality::None, None, 0),
            start + len,
        ))
    };
    let two = |second: char| start + 1 < chars.len() && chars[start + 1] == second;

    match chars[start] {
        'B' if two('r') => make(Element::Br, false, 2),
        'B' => make(Element::B, false, 1),
        'C' if two('l') => make(Element::Cl, false, 2),
        'C' => make(Element::C, false, 1),
        'N' => make(Element::N, false, 1),
        'O' => make(Element::O, false, 1),
        'P' => make(Element::P, false, 1),
        'S' => make(Element::S, false, 1),
        'F' => make(Element::F, false, 1),
        'I' => make(Element::I, false, 1),
        'b' => make(Element::B, true, 1),
        'c' => make(Element::C, true, 1),
        'n' => make(Element::N, true, 1),
        'o' => make(Element::O, true, 1),
        'p' => make(Element::P, true, 1),
        's' => make(Element::S, true, 1),
        ch => Err(SmilesError::UnexpectedChar { pos: start, ch }),
    }
}

fn parse_bracket_atom(chars: &[char], start: usize) -> Result<(Atom, usize), SmilesError> {
    let mut i = start + 1; // skip '['

    let mut isotope: Option<u16> = None;
    let mut value: u32 = 0;
    let mut saw_digit = false;
    while i < chars.len() && chars[i].is_ascii_digit() {
        saw_digit = true;
        value = (value * 10 + (chars[i] as u32 - '0' as u32)).min(u32::from(u16::MAX));
        i += 1;
    }
    if saw_digit {
        isotope = Some(value as u16);
    }

    let (element, is_aromatic) = parse_bracket_element(chars, &mut i, start)?;

    let chirality = parse_chirality(chars, &mut i)?;

    let mut h_count: u8 = 0;
    if i < chars.len() && chars[i] == 'H' {
        i += 1;
        h_count = 1;
        if i < chars.len() && chars[i].is_ascii_digit() {
            h_count = chars[i] as u8 - b'0';
            i += 1;
        }
    }

    let charge = parse_charge(chars, &mut i, start)?;

    if i < chars.len() && chars[i] == ':' {
        return Err(SmilesError::UnsupportedFeature { pos: i, feature: "atom class" });
    }
    if i >= chars.len() || chars[i] != ']' {
        return Err(SmilesError::UnclosedBracket { pos: start });
    }
    i += 1; // skip ']'

    Ok((
        Atom::new(element, is_aromatic, isotope, chirality, Some(h_count), charge),
        i,
    ))
}

fn parse_bracket_element(
    chars: &[char],
    i: &mut usize,
    bracket_start: usize,
) -> Result<(Element, bool), SmilesError> {
    if *i >= chars.len() {
        return Err(SmilesError::UnclosedBracket { pos: bracket_start });
    }

    if chars[*i] == '*' {
        return Err(SmilesError::UnsupportedFeature { pos: *i, feature: "wildcard atom" });
    }

    let aromatic_map: &[(&str, Element)] = &[
        ("se", Element::Se),
        ("te", Element::Te),
        ("b", Element::B),
        ("c", Element::C),
        ("n", Element::N),
        ("o", Element::O),
        ("p", Element::P),
        ("s", Element::S),
    ];

    for &(pat, elem) in aromatic_map {
        if *i + pat.len() <= chars.len() {
            let slice: String = chars[*i..*i + pat.len()].iter().collect();
            if slice == pat {
                let after = *i + pat.len();
                let next_is_lower = after < chars.len() && chars[after].is_ascii_lowercase();
                if !next_is_lower || pat.len() == 2 {
                    *i += pat.len();
                    return Ok((elem, true));
                }
            }
        }
    }

    // two-letter uppercase element first, then one-letter
    if *i + 1 < chars.len() && chars[*i].is_ascii_uppercase() && chars[*i + 1].is_ascii_lowercase()
    {
        let sym: String = chars[*i..=*i + 1].iter().collect();
        if let Some(e) = Element::from_symbol(&sym) {
            *i += 2;
            return Ok((e, false));
        }
    }

    if chars[*i].is_ascii_uppercase() {
        let sym: String = chars[*i..=*i].iter().collect();
        if let Some(e) = Element::from_symbol(&sym) {
            *i += 1;
            return Ok((e, false));
        }
    }

    Err(SmilesError::InvalidElement {
        pos: *i,
        text: chars.get(*i).map(|c| c.to_string()).unwrap_or_default(),
    })
}

fn parse_chirality(chars: &[char], i: &mut usize) -> Result<Chirality, SmilesError> {
    if *i >= chars.len() || chars[*i] != '@' {
        return Ok(Chirality::None);
    }
    *i += 1;
    let chirality = if *i < chars.len() && chars[*i] == '@' {
        *i += 1;
        Chirality::Cw
    } else {
        Chirality::Ccw
    };
    // @TB1, @SP2 and friends are out of scope
    if *i < chars.len() && chars[*i].is_ascii_uppercase() && chars[*i] != 'H' {
        return Err(SmilesError::UnsupportedFeature {
            pos: *i,
            feature: "extended chirality",
        });
    }
    Ok(chirality)
}

fn parse_charge(chars: &[char], i: &mut usize, bracket_start: usize) -> Result<i8, SmilesError> {
    if *i >= chars.len() {
        return Ok(0);
    }

    let sign: i8 = match chars[*i] {
        '+' => 1,
        '-' => -1,
        _ => return Ok(0),
    };
    let sign_char = chars[*i];
    *i += 1;

    if *i < chars.len() && chars[*i] == sign_char {
        // ++ / -- runs
        let mut count: i8 = sign;
        while *i < chars.len() && chars[*i] == sign_char {
            count = count
                .checked_add(sign)
                .ok_or(SmilesError::InvalidCharge { pos: bracket_start })?;
            *i += 1;
        }
        Ok(count)
    } else if *i < chars.len() && chars[*i].is_ascii_digit() {
        let mut value: i8 = 0;
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((chars[*i] as i8) - b'0' as i8))
                .ok_or(SmilesError::InvalidCharge { pos: bracket_start })?;
            *i += 1;
        }
        Ok(sign * value)
    } else {
        Ok(sign)
    }
}

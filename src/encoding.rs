//! Label and one-hot conversions for feeding SELFIES into ML pipelines.
//!
//! Strings are padded with `[nop]`, which the decoder ignores wherever it
//! lands, so padded and unpadded encodings decode identically.

use std::collections::HashMap;
use std::fmt;

use crate::grammar::split_selfies;

pub const PADDING_SYMBOL: &str = "[nop]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    UnknownSymbol(String),
    UnknownLabel(usize),
    WrongShape { len: usize, vocab: usize },
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSymbol(symbol) => {
                write!(f, "symbol '{}' is not in the vocabulary", symbol)
            }
            Self::UnknownLabel(label) => {
                write!(f, "label {} is not in the vocabulary", label)
            }
            Self::WrongShape { len, vocab } => write!(
                f,
                "flat one-hot of length {} is not a multiple of the vocabulary size {}",
                len, vocab
            ),
        }
    }
}

impl std::error::Error for EncodingError {}

/// Converts a SELFIES string into integer labels and a one-hot matrix.
/// The string is padded with `[nop]` up to `pad_to_len` symbols; pass 0 to
/// skip padding.
pub fn selfies_to_encoding(
    selfies: &str,
    vocab_stoi: &HashMap<String, usize>,
    pad_to_len: usize,
) -> Result<(Vec<usize>, Vec<Vec<u8>>), EncodingError> {
    let mut symbols: Vec<&str> = split_selfies(selfies).collect();
    while symbols.len() < pad_to_len {
        symbols.push(PADDING_SYMBOL);
    }

    let mut labels = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let label = vocab_stoi
            .get(symbol)
            .copied()
            .ok_or_else(|| EncodingError::UnknownSymbol(symbol.to_owned()))?;
        labels.push(label);
    }

    let one_hot = labels
        .iter()
        .map(|&label| {
            let mut row = vec![0u8; vocab_stoi.len()];
            row[label] = 1;
            row
        })
        .collect();

    Ok((labels, one_hot))
}

/// Converts integer labels back into a SELFIES string.
pub fn encoding_to_selfies(
    encoding: &[usize],
    vocab_itos: &HashMap<usize, String>,
) -> Result<String, EncodingError> {
    let mut selfies = String::new();
    for &label in encoding {
        let symbol = vocab_itos
            .get(&label)
            .ok_or(EncodingError::UnknownLabel(label))?;
        selfies.push_str(symbol);
    }
    Ok(selfies)
}

/// One-hot encodes a batch of SELFIES strings, flattening each matrix to a
/// single row.
pub fn batch_selfies_to_flat_hot(
    batch: &[String],
    vocab_stoi: &HashMap<String, usize>,
    pad_to_len: usize,
) -> Result<Vec<Vec<u8>>, EncodingError> {
    batch
        .iter()
        .map(|selfies| {
            let (_, one_hot) = selfies_to_encoding(selfies, vocab_stoi, pad_to_len)?;
            Ok(one_hot.into_iter().flatten().collect())
        })
        .collect()
}

/// Recovers SELFIES strings from a batch of flattened one-hot rows.
pub fn batch_flat_hot_to_selfies(
    batch: &[Vec<u8>],
    vocab_itos: &HashMap<usize, String>,
) -> Result<Vec<String>, EncodingError> {
    let vocab = vocab_itos.len();
    batch
        .iter()
        .map(|row| {
            if vocab == 0 || row.len() % vocab != 0 {
                return Err(EncodingError::WrongShape { len: row.len(), vocab });
            }
            let labels: Vec<usize> = row
                .chunks(vocab)
                .map(|chunk| {
                    chunk
                        .iter()
                        .enumerate()
                        .max_by_key(|&(i, v)| (*v, std::cmp::Reverse(i)))
                        .map(|(i, _)| i)
                        .unwrap_or(0)
                })
                .collect();
            encoding_to_selfies(&labels, vocab_itos)
        })
        .collect()
}

//! A robust, bidirectional codec between SMILES and SELFIES molecular string
//! representations.
//!
//! SELFIES (SELF-referencIng Embedded Strings) is a grammar-constrained line
//! notation in which every sequence of alphabet symbols decodes to a valid
//! molecular graph. [`decoder`] turns SELFIES into SMILES and never produces
//! an invalid molecule: bond orders are clamped against each atom's bonding
//! capacity and unformable ring bonds are dropped. [`encoder`] parses SMILES,
//! kekulizes its aromatic systems and emits a SELFIES that decodes back to an
//! equivalent molecule.
//!
//! ```
//! let selfies = selfies::encoder("c1ccccc1").unwrap();
//! assert_eq!(selfies, "[C][=C][C][=C][C][=C][Ring1][=Branch1]");
//! assert_eq!(selfies::decoder(&selfies).unwrap(), "C1=CC=CC=C1");
//! ```
//!
//! The bonding-capacity rules are process-wide and configurable through
//! [`set_semantic_constraints`]; three presets (`default`, `octet_rule`,
//! `hypervalent`) are built in.

pub mod constraints;
mod decoder;
pub mod element;
mod encoder;
pub mod encoding;
pub mod grammar;
mod graph;
mod kekulize;
mod matching;
mod smiles;

pub use constraints::{
    get_preset_constraints, get_semantic_constraints, get_semantic_robust_alphabet,
    set_semantic_constraints, ConstraintsError,
};
pub use decoder::{decoder, decoder_with_attribution, DecoderError};
pub use element::Element;
pub use encoder::{encoder, encoder_with_attribution, EncoderError};
pub use encoding::{
    batch_flat_hot_to_selfies, batch_selfies_to_flat_hot, encoding_to_selfies,
    selfies_to_encoding, EncodingError,
};
pub use grammar::{
    get_alphabet_from_selfies, index_from_symbols, len_selfies, split_selfies,
    symbols_from_index, INDEX_ALPHABET,
};
pub use graph::{Attribution, AttributionMap, TokenAttribution};
pub use smiles::SmilesError;

mod error;
mod parser;
mod writer;

pub use error::SmilesError;
pub(crate) use parser::parse_smiles;
pub(crate) use writer::{write_smiles, write_smiles_attributed};

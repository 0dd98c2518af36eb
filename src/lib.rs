//! Clay (Coupled-Layer) MSR erasure codes
//!
//! A Clay code offers the fault tolerance and storage overhead of a
//! Reed-Solomon code with the same `(k, m)`, while repairing a single lost
//! chunk with `q = d - k + 1` times less network traffic: each of `d`
//! helpers ships only `beta = alpha / q` of its `alpha` sub-chunks.
//!
//! The construction couples `alpha = q^t` layers of an ordinary scalar
//! Reed-Solomon code over GF(2^8) through a pairwise 2x2 transform. Encoding
//! decouples the data layers, runs the scalar code per layer, and couples
//! the parities back; decoding walks the layers in intersection-score order;
//! repair fetches only the layers in which the lost chunk is unpaired.
//!
//! # Example
//!
//! ```
//! use std::collections::{BTreeMap, BTreeSet};
//! use clay_ec::ClayCodec;
//!
//! // 4 data + 2 parity chunks, repairs contact d = 5 helpers
//! let codec = ClayCodec::new(4, 2, 5).unwrap();
//!
//! let object: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
//! let chunks = codec.encode_object(&object).unwrap();
//!
//! // Lose two chunks, read the object back
//! let supplied: BTreeMap<usize, Vec<u8>> = chunks
//!     .iter()
//!     .enumerate()
//!     .filter(|(i, _)| *i != 0 && *i != 5)
//!     .map(|(i, c)| (i, c.clone()))
//!     .collect();
//! let recovered = codec.decode_object(&supplied, object.len()).unwrap();
//! assert_eq!(recovered, object);
//!
//! // Single-chunk loss takes the bandwidth-optimal repair path
//! let want: BTreeSet<usize> = [0].into_iter().collect();
//! let available: BTreeSet<usize> = (1..6).collect();
//! assert!(codec.is_repair(&want, &available));
//! ```
//!
//! # Modules
//!
//! - [`codec`] - The public [`ClayCodec`] engine
//! - [`params`] - Parameter validation and geometry ([`ClayParams`])
//! - [`error`] - Error types
//! - [`galois`] - GF(2^8) scalar and region arithmetic
//! - [`buffer`] - Aligned buffer regions and the sub-chunk matrix
//! - [`cube`] - Layer/vertex indexing over the data cube
//! - [`pair`] - The pairwise coupling codec
//! - [`mds`] - Scalar MDS collaborator wrapping `reed-solomon-erasure`
//!
//! The layered decode and repair walks live in two crate-private modules,
//! `reconstruction` and `repair`; [`ClayCodec`] is their only entry point.

pub mod buffer;
pub mod codec;
pub mod cube;
pub mod error;
pub mod galois;
pub mod mds;
pub mod pair;
pub mod params;

mod reconstruction;
mod repair;

#[cfg(test)]
mod proptest;

// Re-export commonly used types
pub use codec::ClayCodec;
pub use error::{Error, Result};
pub use pair::{PairCodec, PairRole, GAMMA};
pub use params::{ClayParams, SIMD_ALIGN};

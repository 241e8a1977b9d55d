//! Translation validation for a C compiler.
//!
//! For each function the compiler processes, two versions of a small
//! SSA-form IR are built: one from the untransformed program ("src") and
//! one from the compiler's output ("tgt"). The target refines the source
//! when, for every input, either the source has undefined behavior or both
//! produce the same observable outputs; a refinement failure is a
//! miscompilation.
//!
//! The crate provides:
//! - [`ir`]: the IR itself, with explicit UB markers and a byte-granular
//!   memory model over pointer (id, offset) fields.
//! - [`convert`]: the lowering from the compiler's typed SSA tree
//!   ([`tree`]) into IR, encoding every UB condition of the source
//!   language.
//! - [`cfg`]: reverse post-order, dominance, and CFG simplification.
//! - [`asm`]: the RISC-V front-end producing the target function.
//! - [`check`]: structural identity and dispatch to the external SMT
//!   back-end.

pub mod asm;
pub mod cfg;
pub mod check;
pub mod config;
pub mod convert;
pub mod error;
pub mod ir;
pub mod tree;

pub use check::{check_assert, check_refine, check_ub, identical, Pass, SmtBackend, SolverStats};
pub use config::Config;
pub use error::{Error, Result};

//!
//! Expanded-state HMM construction with tied transition parameters
//!
//! * `template`: expanded states, StateMap and adjacency
//! * `builder`: transition skeleton and equality constraints for the
//!   likelihood and posterior tying modes
//!
pub mod builder;
pub mod template;

pub use builder::{build, rewrite_degenerate, EqualityConstraint, TiedTransitions};
pub use template::{ExpandedState, StateMap, Template};

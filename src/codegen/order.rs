//! Evaluation order of sibling expressions.
//!
//! Siblings are generated heaviest first, where weight is the Sethi-Ullman
//! estimate of how many registers a subtree keeps live. Generating the
//! hungriest subtree while the pool is emptiest lowers peak register use.
//! Ties keep source order, so the result is deterministic.

use std::cmp::Reverse;

use crate::ast::{Expr, ExprKind};

/// Registers needed to evaluate `expr` without spilling.
pub fn weight(expr: &Expr) -> u32 {
  match &expr.kind {
    ExprKind::Unary { operand, .. } => weight(operand),
    ExprKind::Binary { lhs, rhs, .. } => {
      let (lhs, rhs) = (weight(lhs), weight(rhs));
      if lhs == rhs { lhs + 1 } else { lhs.max(rhs) }
    }
    // The array pointer stays live while each index is computed.
    ExprKind::ArrayElem(elem) => 1 + elem.indices.iter().map(weight).max().unwrap_or(0),
    _ => 1,
  }
}

/// Indices of `exprs` in the order they should be generated.
pub fn evaluation_order(exprs: &[&Expr]) -> Vec<usize> {
  let mut order: Vec<usize> = (0..exprs.len()).collect();
  order.sort_by_key(|&index| Reverse(weight(exprs[index])));
  order
}

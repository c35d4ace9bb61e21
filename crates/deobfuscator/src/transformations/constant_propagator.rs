use std::collections::HashMap;

use swc_core::ecma::ast::{Expr, Lit, Module, UnaryExpr, UnaryOp};

use crate::binding::{collect_constants, remove_all};
use crate::config::TransformationKey;
use crate::mutate::replace_reads;
use crate::transformation::{
  Outcome, TransformContext, TransformError, Transformation, TransformationProperties,
};

/// Replaces reads of variables bound to a single literal with the literal.
#[derive(Default)]
pub struct ConstantPropagator;

/// Literals that are safe to copy. Each evaluation of a regex literal creates a new object.
fn propagatable_literal(expr: &Expr) -> Option<Expr> {
  match expr {
    Expr::Lit(Lit::Regex(_)) | Expr::Lit(Lit::JSXText(_)) => None,
    Expr::Lit(_) => Some(expr.clone()),
    Expr::Unary(UnaryExpr {
      op: UnaryOp::Minus,
      arg,
      ..
    }) if matches!(&**arg, Expr::Lit(Lit::Num(_))) => Some(expr.clone()),
    _ => None,
  }
}

impl Transformation for ConstantPropagator {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::ConstantPropagation,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let bindings = context.scope.bindings(module);
    let constants = collect_constants(module, bindings, propagatable_literal);
    if constants.is_empty() {
      return Ok(false);
    }

    let replacements: HashMap<_, _> = constants
      .iter()
      .map(|constant| (constant.id.clone(), constant.expression.clone()))
      .collect();
    let replaced = replace_reads(module, replacements);
    remove_all(module, &constants);

    context.report(Outcome::Matched(format!(
      "Propagated {} constants into {} reads",
      constants.len(),
      replaced
    )));
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::transformation::test_utils::{assert_transforms, assert_unchanged};

  #[test]
  fn test_propagates_literals() {
    assert_transforms(
      "var a = 5; f(a); g(a);",
      ConstantPropagator,
      "f(5); g(5);",
    );
  }

  #[test]
  fn test_keeps_sibling_declarators() {
    assert_transforms(
      "var a = 'x', b = g(); f(a, b, { a });",
      ConstantPropagator,
      "var b = g(); f('x', b, { a: 'x' });",
    );
  }

  #[test]
  fn test_propagates_negative_numbers() {
    assert_transforms("const a = -1; f(a);", ConstantPropagator, "f(-1);");
  }

  #[test]
  fn test_propagates_single_direct_parameter_assignment() {
    assert_transforms(
      indoc! {r#"
        function f(a) {
          a = 2;
          return a * a;
        }
      "#},
      ConstantPropagator,
      "function f(a) { return 2 * 2; }",
    );
  }

  #[test]
  fn test_skips_conditionally_assigned_parameter() {
    assert_unchanged(
      "function f(a) { if (c) { a = 2; } return a; }",
      ConstantPropagator,
    );
  }

  #[test]
  fn test_skips_reassigned_and_regex() {
    assert_unchanged("var a = 1; a = 2; f(a); var r = /x/g; g(r, r);", ConstantPropagator);
  }

  #[test]
  fn test_skips_reads_before_declaration() {
    assert_unchanged("f(a); var a = 1; f(a);", ConstantPropagator);
    assert_unchanged(
      "function r() { return x; } f(r()); var x = 1;",
      ConstantPropagator,
    );
  }
}

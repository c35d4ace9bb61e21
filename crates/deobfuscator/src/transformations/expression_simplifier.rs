use std::cmp::Ordering;

use swc_core::common::SyntaxContext;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

use crate::config::TransformationKey;
use crate::transformation::{
  TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::{
  bool_expr, is_pure, number_expr, str_expr, to_int32, to_uint32, undefined_expr, LiteralValue,
};

/// Folds unary and binary operators over literal operands.
#[derive(Default)]
pub struct ExpressionSimplifier;

struct Folder {
  /// `undefined` refers to the global only when nothing in the program shadows it.
  undefined: Option<SyntaxContext>,
  changed: bool,
}

fn fold_unary(unary: &UnaryExpr, undefined: Option<SyntaxContext>) -> Option<Expr> {
  if let (UnaryOp::Bang, Expr::Array(_) | Expr::Object(_)) = (unary.op, &*unary.arg) {
    return is_pure(&unary.arg).then(|| bool_expr(false));
  }
  if let (UnaryOp::TypeOf, Expr::Fn(_) | Expr::Arrow(_)) = (unary.op, &*unary.arg) {
    return Some(str_expr("function"));
  }

  let value = LiteralValue::from_expr(&unary.arg)?;
  match unary.op {
    // `-5` is how negative numbers are written
    UnaryOp::Minus => match (&*unary.arg, value) {
      (Expr::Lit(Lit::Num(_)), _) => None,
      (_, value) => number_expr(-value.to_number()),
    },
    UnaryOp::Plus => number_expr(value.to_number()),
    UnaryOp::Bang => Some(bool_expr(!value.is_truthy())),
    UnaryOp::Tilde => number_expr(f64::from(!to_int32(value.to_number()))),
    UnaryOp::TypeOf => Some(str_expr(value.type_of())),
    UnaryOp::Void => undefined.map(undefined_expr),
    UnaryOp::Delete => None,
  }
}

/// Compare strings by UTF-16 code units as the `<` operator does.
fn compare_strings(left: &str, right: &str) -> Ordering {
  left.encode_utf16().cmp(right.encode_utf16())
}

fn relational(op: BinaryOp, left: &LiteralValue, right: &LiteralValue) -> bool {
  let ordering = match (left, right) {
    (LiteralValue::String(left), LiteralValue::String(right)) => Some(compare_strings(left, right)),
    _ => left.to_number().partial_cmp(&right.to_number()),
  };
  let Some(ordering) = ordering else {
    return false;
  };

  match op {
    BinaryOp::Lt => ordering == Ordering::Less,
    BinaryOp::Gt => ordering == Ordering::Greater,
    BinaryOp::LtEq => ordering != Ordering::Greater,
    _ => ordering != Ordering::Less,
  }
}

/// Derived equality already treats `NaN` and `-0` like `===` does.
fn strict_equals(left: &LiteralValue, right: &LiteralValue) -> bool {
  left == right
}

/// `==` between primitives compares numbers once the types differ.
fn loose_equals(left: &LiteralValue, right: &LiteralValue) -> bool {
  if left.type_of() == right.type_of() {
    strict_equals(left, right)
  } else {
    left.to_number() == right.to_number()
  }
}

/// `base ** exponent`, which unlike `powf` is NaN for a NaN exponent or `(±1) ** ±Infinity`.
fn exponentiate(base: f64, exponent: f64) -> f64 {
  if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
    f64::NAN
  } else {
    base.powf(exponent)
  }
}

fn fold_binary(bin: &BinExpr) -> Option<Expr> {
  let left = LiteralValue::from_expr(&bin.left)?;
  let right = LiteralValue::from_expr(&bin.right)?;

  let number = |f: fn(f64, f64) -> f64| number_expr(f(left.to_number(), right.to_number()));
  let int32 = |f: fn(i32, i32) -> i32| {
    number_expr(f64::from(f(
      to_int32(left.to_number()),
      to_int32(right.to_number()),
    )))
  };
  let shift = to_uint32(right.to_number()) & 31;

  match bin.op {
    BinaryOp::Add => match (&left, &right) {
      (LiteralValue::String(_), _) | (_, LiteralValue::String(_)) => Some(str_expr(&format!(
        "{}{}",
        left.to_js_string(),
        right.to_js_string()
      ))),
      _ => number(|a, b| a + b),
    },
    BinaryOp::Sub => number(|a, b| a - b),
    BinaryOp::Mul => number(|a, b| a * b),
    BinaryOp::Div => number(|a, b| a / b),
    BinaryOp::Mod => number(|a, b| a % b),
    BinaryOp::Exp => number(exponentiate),
    BinaryOp::BitOr => int32(|a, b| a | b),
    BinaryOp::BitAnd => int32(|a, b| a & b),
    BinaryOp::BitXor => int32(|a, b| a ^ b),
    BinaryOp::LShift => number_expr(f64::from(to_int32(left.to_number()).wrapping_shl(shift))),
    BinaryOp::RShift => number_expr(f64::from(to_int32(left.to_number()) >> shift)),
    BinaryOp::ZeroFillRShift => number_expr(f64::from(to_uint32(left.to_number()) >> shift)),
    BinaryOp::EqEq => Some(bool_expr(loose_equals(&left, &right))),
    BinaryOp::NotEq => Some(bool_expr(!loose_equals(&left, &right))),
    BinaryOp::EqEqEq => Some(bool_expr(strict_equals(&left, &right))),
    BinaryOp::NotEqEq => Some(bool_expr(!strict_equals(&left, &right))),
    BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
      Some(bool_expr(relational(bin.op, &left, &right)))
    }
    _ => None,
  }
}

impl VisitMut for Folder {
  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    expr.visit_mut_children_with(self);

    let folded = match expr {
      Expr::Unary(unary) => fold_unary(unary, self.undefined),
      Expr::Bin(bin) => fold_binary(bin),
      _ => None,
    };
    if let Some(folded) = folded {
      *expr = folded;
      self.changed = true;
    }
  }

  // `0x1f` is written as `31`
  fn visit_mut_number(&mut self, number: &mut Number) {
    let is_prefixed = number.raw.as_ref().is_some_and(|raw| {
      raw.len() > 1 && raw.starts_with('0') && raw[1..2].chars().all(|c| c.is_ascii_alphabetic())
    });
    if is_prefixed && number.value.is_finite() {
      number.raw = None;
      self.changed = true;
    }
  }
}

impl Transformation for ExpressionSimplifier {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::ExpressionSimplification,
      rebuild_scope_tree: false,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let shadowed = context.scope.bindings(module).declares_name("undefined");
    let mut folder = Folder {
      undefined: (!shadowed).then(|| SyntaxContext::empty().apply_mark(context.unresolved_mark)),
      changed: false,
    };
    module.visit_mut_with(&mut folder);
    Ok(folder.changed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transformation::test_utils::{
    assert_transforms, assert_unchanged, run_test_transformation,
  };

  #[test]
  fn test_folds_arithmetic() {
    assert_transforms(
      "a = 1 + 2; b = 0x10 * 2; c = 7 % 4 - 10; d = 2 ** 10;",
      ExpressionSimplifier,
      "a = 3; b = 32; c = -7; d = 1024;",
    );
  }

  #[test]
  fn test_folds_strings() {
    assert_transforms(
      r#"a = "a" + 1; b = 1 + "b"; c = "x" + "y" + "z"; d = "" + true;"#,
      ExpressionSimplifier,
      r#"a = "a1"; b = "1b"; c = "xyz"; d = "true";"#,
    );
  }

  #[test]
  fn test_folds_unary_operators() {
    assert_transforms(
      "a = !0; b = !![]; c = !{}; d = -(-5); e = +'3'; f = ~5; g = typeof 'x';",
      ExpressionSimplifier,
      r#"a = true; b = true; c = false; d = 5; e = 3; f = -6; g = "string";"#,
    );
  }

  #[test]
  fn test_folds_bitwise_operators() {
    assert_transforms(
      "a = 5 | 2; b = 6 & 3; c = 5 ^ 1; d = 1 << 4; e = -16 >> 2; f = -1 >>> 28;",
      ExpressionSimplifier,
      "a = 7; b = 2; c = 4; d = 16; e = -4; f = 15;",
    );
  }

  #[test]
  fn test_folds_comparisons() {
    assert_transforms(
      "a = 1 == '1'; b = 1 === '1'; c = 'b' < 'a'; d = 2 >= 2; e = 1 !== 2; f = 0 == false;",
      ExpressionSimplifier,
      "a = true; b = false; c = false; d = true; e = true; f = true;",
    );
  }

  #[test]
  fn test_void_becomes_undefined() {
    assert_transforms("x = void 0;", ExpressionSimplifier, "x = undefined;");
  }

  #[test]
  fn test_void_is_kept_when_undefined_is_shadowed() {
    assert_unchanged("function f(undefined) { return void 0; }", ExpressionSimplifier);
  }

  #[test]
  fn test_leaves_non_finite_and_negative_literals() {
    assert_unchanged("a = 1 / 0; b = -5; c = 0 / 0; d = ![f()];", ExpressionSimplifier);
  }

  #[test]
  fn test_exponentiation_follows_js() {
    assert_unchanged("a = 1 ** 'a';", ExpressionSimplifier);
    assert_transforms("a = 2 ** 10; b = 1 ** 0;", ExpressionSimplifier, "a = 1024; b = 1;");
    assert!(exponentiate(1.0, f64::NAN).is_nan());
    assert!(exponentiate(-1.0, f64::INFINITY).is_nan());
    assert_eq!(exponentiate(f64::NAN, 0.0), 1.0);
  }

  #[test]
  fn test_reaches_fixed_point() {
    let run = run_test_transformation("x = -0x1 + 0x2;", ExpressionSimplifier);
    assert!(run.changed);
    assert_unchanged(&run.output_code, ExpressionSimplifier);
  }
}

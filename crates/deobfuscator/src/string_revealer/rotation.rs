use indexmap::IndexMap;
use swc_core::common::Mark;
use swc_core::ecma::ast::*;

use crate::matchers::{
  any, call, declaration_or_assignment, function_body, ident, iife_callee, match_node,
  numeric_value, Matcher,
};
use crate::string_revealer::decoder::StringDecoder;
use crate::utils::{known_truthiness, number_to_string, parse_int, string_to_number};

/// Upper bound of simulated rotations.
pub const MAX_ROTATIONS: usize = 1_000_000;

/// The self-invoking function that shifts a string table until a checksum matches:
///
/// ```js
/// (function (table, stop) {
///   var strings = table();
///   while (true) {
///     try {
///       var value = -parseInt(wrapper(0x1e5)) / 1 + parseInt(wrapper(0x1f0)) / 2;
///       if (value === stop) break;
///       else strings.push(strings.shift());
///     } catch (e) {
///       strings.push(strings.shift());
///     }
///   }
/// })(table, 0x9f3a1);
/// ```
#[derive(Clone, Debug)]
pub struct Rotation {
  pub stop: f64,
  checksum: Expr,
}

fn table_call() -> impl Matcher<Expr> {
  call(ident(any::<Ident>()), vec![])
}

/// `strings = table()` or `var strings = table()`
fn table_copy() -> impl Matcher<Stmt> {
  declaration_or_assignment(any::<Ident>(), table_call())
}

fn is_always_true(test: &Expr) -> bool {
  known_truthiness(test) == Some(true)
}

/// The body of the rotation loop, in any of the three shapes the obfuscator emits.
fn loop_body(body: &[Stmt]) -> Option<&Stmt> {
  match body {
    [Stmt::For(for_stmt)] => {
      let init_matches = match &for_stmt.init {
        Some(VarDeclOrExpr::VarDecl(var)) => match var.decls.as_slice() {
          [declarator] => declarator
            .init
            .as_deref()
            .is_some_and(|init| match_node(&table_call(), init).is_some()),
          _ => false,
        },
        Some(VarDeclOrExpr::Expr(expr)) => {
          let stmt = Stmt::Expr(ExprStmt {
            span: Default::default(),
            expr: expr.clone(),
          });
          match_node(&table_copy(), &stmt).is_some()
        }
        None => false,
      };
      let test_matches = for_stmt.test.as_deref().is_some_and(is_always_true);
      (init_matches && test_matches).then_some(&*for_stmt.body)
    }
    [copy, Stmt::While(while_stmt)] if match_node(&table_copy(), copy).is_some() => {
      is_always_true(&while_stmt.test).then_some(&*while_stmt.body)
    }
    [Stmt::While(while_stmt)] => {
      let Stmt::Block(block) = &*while_stmt.body else {
        return None;
      };
      (is_always_true(&while_stmt.test) && matches!(block.stmts.as_slice(), [Stmt::Try(_)]))
        .then_some(&*while_stmt.body)
    }
    _ => None,
  }
}

/// The value assigned by the first statement of the `try` block
fn checksum(body: &Stmt) -> Option<&Expr> {
  let Stmt::Block(block) = body else {
    return None;
  };
  let Some(Stmt::Try(try_stmt)) = block.stmts.first() else {
    return None;
  };
  match try_stmt.block.stmts.first()? {
    Stmt::Decl(Decl::Var(var)) => match var.decls.as_slice() {
      [declarator] => declarator.init.as_deref(),
      _ => None,
    },
    Stmt::Expr(ExprStmt { expr, .. }) => match &**expr {
      Expr::Assign(AssignExpr {
        op: AssignOp::Assign,
        right,
        ..
      }) => Some(&**right),
      _ => None,
    },
    _ => None,
  }
  .filter(|expr| matches!(expr, Expr::Bin(_)))
}

impl Rotation {
  /// Recognise `(function (t, s) { ... })(table, stop)`.
  pub fn from_call(call: &CallExpr, table: &Id) -> Option<Rotation> {
    let [first, stop] = call.args.as_slice() else {
      return None;
    };
    if first.spread.is_some() || stop.spread.is_some() {
      return None;
    }
    if !matches!(&*first.expr, Expr::Ident(ident) if ident.to_id() == *table) {
      return None;
    }
    let stop = numeric_value(&stop.expr)?;

    let function = iife_callee(call)?;
    let checksum = checksum(loop_body(function_body(function)?)?)?;
    Some(Rotation {
      stop,
      checksum: checksum.clone(),
    })
  }

  pub fn is_call_of(expr: &Expr, table: &Id) -> bool {
    matches!(expr, Expr::Call(call) if Rotation::from_call(call, table).is_some())
  }

  /// Rotate `table` until the checksum equals the stop value. Returns false and leaves the
  /// table in its initial order when no rotation matches.
  pub fn simulate(
    &self,
    table: &mut Vec<String>,
    decoders: &IndexMap<Id, StringDecoder>,
    unresolved_mark: Mark,
  ) -> bool {
    let evaluator = Evaluator {
      decoders,
      unresolved_mark,
    };

    // The order repeats after one full turn
    let steps = MAX_ROTATIONS.min(table.len());
    for step in 0..steps {
      if evaluator.evaluate(&self.checksum, table) == Some(self.stop) {
        tracing::debug!(rotations = step, "String table rotated");
        return true;
      }
      table.rotate_left(1);
    }

    let len = table.len();
    table.rotate_right(steps % len.max(1));
    false
  }
}

/// Evaluates the checksum expression: number and string literals, negation, arithmetic,
/// `parseInt` and calls of the string table wrappers.
struct Evaluator<'a> {
  decoders: &'a IndexMap<Id, StringDecoder>,
  unresolved_mark: Mark,
}

impl Evaluator<'_> {
  fn evaluate(&self, expr: &Expr, table: &[String]) -> Option<f64> {
    match expr {
      Expr::Lit(Lit::Num(number)) => Some(number.value),
      Expr::Lit(Lit::Str(string)) => Some(string_to_number(&string.value)),
      Expr::Paren(paren) => self.evaluate(&paren.expr, table),
      Expr::Unary(UnaryExpr {
        op: UnaryOp::Minus,
        arg,
        ..
      }) => Some(-self.evaluate(arg, table)?),
      Expr::Bin(bin) => {
        let left = self.evaluate(&bin.left, table)?;
        let right = self.evaluate(&bin.right, table)?;
        match bin.op {
          BinaryOp::Add => Some(left + right),
          BinaryOp::Sub => Some(left - right),
          BinaryOp::Mul => Some(left * right),
          BinaryOp::Div => Some(left / right),
          BinaryOp::Mod => Some(left % right),
          _ => None,
        }
      }
      Expr::Call(call) => self.evaluate_call(call, table),
      _ => None,
    }
  }

  fn evaluate_call(&self, call: &CallExpr, table: &[String]) -> Option<f64> {
    let Expr::Ident(callee) = &**call.callee.as_expr()? else {
      return None;
    };
    if call.args.iter().any(|arg| arg.spread.is_some()) {
      return None;
    }

    if let Some(decoder) = self.decoders.get(&callee.to_id()) {
      let (index, key) = match call.args.as_slice() {
        [index] => (numeric_value(&index.expr)?, None),
        [index, key] => {
          let key = match &*key.expr {
            Expr::Lit(Lit::Str(key)) => Some(&*key.value),
            _ => None,
          };
          (numeric_value(&index.expr)?, key)
        }
        _ => return None,
      };
      return decoder
        .decode(table, index, key)
        .map(|value| parse_int(&value));
    }

    let is_parse_int =
      &*callee.sym == "parseInt" && callee.ctxt.outer() == self.unresolved_mark;
    match call.args.as_slice() {
      [value] if is_parse_int => Some(parse_int(&number_to_string(
        self.evaluate(&value.expr, table)?,
      ))),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use swc_core::common::sync::Lrc;
  use swc_core::common::{FileName, Globals, SourceMap, GLOBALS};
  use swc_core::ecma::transforms::base::resolver;
  use swc_core::ecma::visit::VisitMutWith;

  use super::*;
  use crate::string_revealer::decoder::DecoderKind;

  /// Parses `code`, finds the rotation call of `table` and simulates it with a basic decoder
  /// bound to `wrapper`.
  fn rotate(code: &str, strings: &[&str]) -> Option<Vec<String>> {
    GLOBALS.set(&Globals::new(), || {
      let source_map = Lrc::new(SourceMap::default());
      let mut module =
        deobfuscator_swc_runner::parse_module(&source_map, FileName::Anon, code).unwrap();
      let unresolved_mark = Mark::new();
      module.visit_mut_with(&mut resolver(unresolved_mark, Mark::new(), false));

      let mut table_id = None;
      let mut wrapper_id = None;
      for item in &module.body {
        match item {
          ModuleItem::Stmt(Stmt::Decl(Decl::Fn(function))) if &*function.ident.sym == "table" => {
            table_id = Some(function.ident.to_id())
          }
          ModuleItem::Stmt(Stmt::Decl(Decl::Fn(function))) if &*function.ident.sym == "wrapper" => {
            wrapper_id = Some(function.ident.to_id())
          }
          _ => {}
        }
      }
      let (table_id, wrapper_id) = (table_id.unwrap(), wrapper_id.unwrap());

      let rotation = module
        .body
        .iter()
        .find_map(|item| match item {
          ModuleItem::Stmt(Stmt::Expr(ExprStmt { expr, .. })) => match &**expr {
            Expr::Call(call) => Rotation::from_call(call, &table_id),
            _ => None,
          },
          _ => None,
        })
        .unwrap();

      let decoders = IndexMap::from([(wrapper_id, StringDecoder::new(DecoderKind::Basic, 0))]);
      let mut table: Vec<String> = strings.iter().map(|s| s.to_string()).collect();
      rotation
        .simulate(&mut table, &decoders, unresolved_mark)
        .then_some(table)
    })
  }

  #[test]
  fn test_while_with_copy() {
    let code = r#"
      function table() {}
      function wrapper(i) {}
      (function (t, stop) {
        var s = t();
        while (true) {
          try {
            var v = parseInt(wrapper(0)) * 2 + -parseInt(wrapper(1));
            if (v === stop) break;
            else s.push(s.shift());
          } catch (e) {
            s.push(s.shift());
          }
        }
      })(table, 5);
    "#;
    // 2 * 4 - 3
    assert_eq!(
      rotate(code, &["1", "2", "4", "3"]),
      Some(vec!["4".into(), "3".into(), "1".into(), "2".into()])
    );
  }

  #[test]
  fn test_for_loop() {
    let code = r#"
      function table() {}
      function wrapper(i) {}
      (function (t, stop) {
        for (var s = t(); !![];) {
          try {
            var v = parseInt(wrapper(0)) / 1 + parseInt(wrapper(1)) / 2;
            if (v === stop) break;
            else s.push(s.shift());
          } catch (e) {
            s.push(s.shift());
          }
        }
      })(table, 11);
    "#;
    // 10 + 2 / 2
    assert_eq!(
      rotate(code, &["2x", "10abc", "2"]),
      Some(vec!["10abc".into(), "2".into(), "2x".into()])
    );
  }

  #[test]
  fn test_no_match_keeps_order() {
    let code = r#"
      function table() {}
      function wrapper(i) {}
      (function (t, stop) {
        while (true) {
          try {
            v = parseInt(wrapper(0)) - 1;
            if (v === stop) break;
          } catch (e) {}
        }
      })(table, 100);
    "#;
    assert_eq!(rotate(code, &["1", "2", "3"]), None);
  }

  #[test]
  fn test_rejects_other_calls() {
    GLOBALS.set(&Globals::new(), || {
      let source_map = Lrc::new(SourceMap::default());
      let module = deobfuscator_swc_runner::parse_module(
        &source_map,
        FileName::Anon,
        "(function (t, stop) { while (x) { try { v = 1 + 1; } catch (e) {} } })(table, 1);",
      )
      .unwrap();
      let ModuleItem::Stmt(Stmt::Expr(ExprStmt { expr, .. })) = &module.body[0] else {
        panic!("expected an expression statement");
      };
      let Expr::Call(call) = &**expr else {
        panic!("expected a call");
      };
      let Expr::Ident(table) = &*call.args[0].expr else {
        panic!("expected an identifier");
      };
      assert!(Rotation::from_call(call, &table.to_id()).is_none());
    });
  }
}

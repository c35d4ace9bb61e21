use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

use crate::config::TransformationKey;
use crate::mutate::empty_stmt;
use crate::transformation::{
  TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::{bool_expr, known_truthiness, StmtItem};

/// Removes branches whose condition is known and rewrites `test ? true : false` style
/// conditionals into boolean expressions.
#[derive(Default)]
pub struct DeadBranchRemover {
  changed: bool,
}

/// Placeholder left behind when a subexpression is moved out.
fn invalid_expr() -> Expr {
  Expr::Invalid(Invalid { span: DUMMY_SP })
}

/// If `stmt` is an `if` with a known test, take its live branch out of it.
///
/// Returns `Some(None)` when the statement disappears entirely.
fn take_live_branch(stmt: &mut Stmt) -> Option<Option<Stmt>> {
  let Stmt::If(if_stmt) = stmt else {
    return None;
  };
  if known_truthiness(&if_stmt.test)? {
    Some(Some(std::mem::replace(&mut *if_stmt.cons, empty_stmt())))
  } else {
    Some(if_stmt.alt.take().map(|alt| *alt))
  }
}

/// Block contents can be moved to the enclosing list unless they declare block scoped names.
fn can_splice(block: &BlockStmt) -> bool {
  block.stmts.iter().all(|stmt| match stmt {
    Stmt::Decl(Decl::Var(var)) => var.kind == VarDeclKind::Var,
    Stmt::Decl(_) => false,
    _ => true,
  })
}

fn negate(expr: Box<Expr>) -> Box<Expr> {
  Box::new(Expr::Unary(UnaryExpr {
    span: DUMMY_SP,
    op: UnaryOp::Bang,
    arg: expr,
  }))
}

/// `test ? true : false` and friends
fn simplify_boolean_conditional(cond: &mut CondExpr) -> Option<Expr> {
  let (Expr::Lit(Lit::Bool(cons)), Expr::Lit(Lit::Bool(alt))) = (&*cond.cons, &*cond.alt) else {
    return None;
  };
  let (cons, alt) = (cons.value, alt.value);
  let test = std::mem::replace(&mut cond.test, Box::new(invalid_expr()));

  Some(match (cons, alt) {
    (true, false) => *negate(negate(test)),
    (false, true) => *negate(test),
    (value, _) => Expr::Seq(SeqExpr {
      span: cond.span,
      exprs: vec![test, Box::new(bool_expr(value))],
    }),
  })
}

impl DeadBranchRemover {
  fn remove_in_list<T: StmtItem + VisitMutWith<Self>>(&mut self, items: &mut Vec<T>) {
    let mut output = Vec::with_capacity(items.len());

    for mut item in std::mem::take(items) {
      let branch = match item.as_stmt_mut() {
        Some(stmt) => {
          stmt.visit_mut_children_with(self);
          take_live_branch(stmt)
        }
        None => {
          item.visit_mut_with(self);
          None
        }
      };

      let Some(branch) = branch else {
        output.push(item);
        continue;
      };

      self.changed = true;
      match branch {
        Some(Stmt::Block(block)) if can_splice(&block) => {
          output.extend(block.stmts.into_iter().map(T::from_stmt));
        }
        Some(stmt) => output.push(T::from_stmt(stmt)),
        None => {}
      }
    }

    *items = output;
  }
}

impl VisitMut for DeadBranchRemover {
  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    self.remove_in_list(stmts);
  }

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    self.remove_in_list(items);
  }

  // Statements outside of a list, such as `else if` or a loop body without braces
  fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
    stmt.visit_mut_children_with(self);

    if let Some(branch) = take_live_branch(stmt) {
      *stmt = branch.unwrap_or_else(empty_stmt);
      self.changed = true;
    }
  }

  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    expr.visit_mut_children_with(self);

    let Expr::Cond(cond) = expr else {
      return;
    };

    let replacement = match known_truthiness(&cond.test) {
      Some(true) => Some(std::mem::replace(&mut *cond.cons, invalid_expr())),
      Some(false) => Some(std::mem::replace(&mut *cond.alt, invalid_expr())),
      None => simplify_boolean_conditional(cond),
    };

    if let Some(replacement) = replacement {
      *expr = replacement;
      self.changed = true;
    }
  }
}

impl Transformation for DeadBranchRemover {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::DeadBranchRemoval,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    _context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    module.visit_mut_with(self);
    Ok(self.changed)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::transformation::test_utils::{assert_transforms, assert_unchanged};

  #[test]
  fn test_keeps_live_consequent() {
    assert_transforms(
      "if (true) { a(); } else { b(); }",
      DeadBranchRemover::default(),
      "a();",
    );
  }

  #[test]
  fn test_removes_statement_without_alternate() {
    assert_transforms("if (false) { a(); } c();", DeadBranchRemover::default(), "c();");
  }

  #[test]
  fn test_takes_alternate() {
    assert_transforms(
      indoc! {r#"
        function f() {
          if ('') {
            a();
          } else if (1) {
            b();
          } else {
            c();
          }
        }
      "#},
      DeadBranchRemover::default(),
      "function f() { b(); }",
    );
  }

  #[test]
  fn test_arrays_and_objects_are_truthy() {
    assert_transforms(
      "if ([]) { a(); } if (!{}) { b(); } x = {} ? 1 : 2; y = !![] ? 3 : 4;",
      DeadBranchRemover::default(),
      "a(); x = 1; y = 3;",
    );
  }

  #[test]
  fn test_keeps_block_scoped_declarations_in_block() {
    assert_transforms(
      "if (1) { let a = 1; f(a); }",
      DeadBranchRemover::default(),
      "{ let a = 1; f(a); }",
    );
  }

  #[test]
  fn test_nested_statement_position() {
    assert_transforms(
      "for (;;) if (0) a();",
      DeadBranchRemover::default(),
      "for (;;);",
    );
  }

  #[test]
  fn test_boolean_conditionals() {
    assert_transforms(
      "a = x ? true : false; b = x ? false : true; c = f() ? true : true; d = f() ? false : false;",
      DeadBranchRemover::default(),
      "a = !!x; b = !x; c = (f(), true); d = (f(), false);",
    );
  }

  #[test]
  fn test_unknown_tests_are_kept() {
    assert_unchanged(
      "if (a) { b(); } x = a ? 1 : 2; if ([f()]) { c(); }",
      DeadBranchRemover::default(),
    );
  }
}

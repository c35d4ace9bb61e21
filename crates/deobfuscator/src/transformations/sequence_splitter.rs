use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

use crate::config::TransformationKey;
use crate::transformation::{
  TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::StmtItem;

/// Splits comma expressions into separate statements.
#[derive(Default)]
pub struct SequenceSplitter {
  changed: bool,
}

/// Nested sequences flattened into one list
fn flatten(exprs: Vec<Box<Expr>>) -> Vec<Box<Expr>> {
  let mut flat = Vec::with_capacity(exprs.len());
  for expr in exprs {
    match *expr {
      Expr::Seq(seq) => flat.extend(flatten(seq.exprs)),
      expr => flat.push(Box::new(expr)),
    }
  }
  flat
}

/// Replace `(a, b, c)` with `c` and return `[a, b]`.
fn take_prefix(expr: &mut Box<Expr>) -> Vec<Box<Expr>> {
  let Expr::Seq(seq) = &mut **expr else {
    return vec![];
  };
  let mut exprs = flatten(std::mem::take(&mut seq.exprs));
  let Some(last) = exprs.pop() else {
    return vec![];
  };
  *expr = last;
  exprs
}

fn expr_stmt(expr: Box<Expr>) -> Stmt {
  Stmt::Expr(ExprStmt {
    span: DUMMY_SP,
    expr,
  })
}

/// The statements `stmt` splits into, or `None` when it stays as it is.
fn split(stmt: &mut Stmt) -> Option<Vec<Stmt>> {
  let prefix = match stmt {
    Stmt::Expr(ExprStmt { expr, .. }) => match &mut **expr {
      Expr::Seq(seq) => {
        let exprs = flatten(std::mem::take(&mut seq.exprs));
        return Some(exprs.into_iter().map(expr_stmt).collect());
      }
      Expr::Cond(cond) => take_prefix(&mut cond.test),
      _ => return None,
    },
    Stmt::Return(ReturnStmt { arg: Some(arg), .. }) => take_prefix(arg),
    Stmt::Throw(throw_stmt) => take_prefix(&mut throw_stmt.arg),
    Stmt::If(if_stmt) => take_prefix(&mut if_stmt.test),
    // Declarations with several declarators are kept whole
    Stmt::Decl(Decl::Var(var)) => match var.decls.as_mut_slice() {
      [VarDeclarator {
        init: Some(init), ..
      }] => take_prefix(init),
      _ => return None,
    },
    _ => return None,
  };
  if prefix.is_empty() {
    return None;
  }

  let mut stmts: Vec<Stmt> = prefix.into_iter().map(expr_stmt).collect();
  stmts.push(std::mem::replace(stmt, Stmt::Empty(EmptyStmt { span: DUMMY_SP })));
  Some(stmts)
}

impl SequenceSplitter {
  fn split_in_list<T: StmtItem + VisitMutWith<Self>>(&mut self, items: &mut Vec<T>) {
    let mut output = Vec::with_capacity(items.len());

    for mut item in std::mem::take(items) {
      let Some(stmt) = item.as_stmt_mut() else {
        item.visit_mut_with(self);
        output.push(item);
        continue;
      };

      stmt.visit_mut_children_with(self);
      match split(stmt) {
        Some(stmts) => {
          self.changed = true;
          output.extend(stmts.into_iter().map(T::from_stmt));
        }
        None => output.push(item),
      }
    }

    *items = output;
  }
}

impl VisitMut for SequenceSplitter {
  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    self.split_in_list(stmts);
  }

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    self.split_in_list(items);
  }

  // A statement outside of a list becomes a block
  fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
    stmt.visit_mut_children_with(self);

    if let Some(stmts) = split(stmt) {
      *stmt = Stmt::Block(BlockStmt {
        stmts,
        ..Default::default()
      });
      self.changed = true;
    }
  }
}

impl Transformation for SequenceSplitter {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::SequenceSplitting,
      rebuild_scope_tree: false,
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

use std::collections::HashSet;

use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

use crate::binding::collect_constants;
use crate::config::TransformationKey;
use crate::matchers::numeric_value;
use crate::mutate::references_any;
use crate::transformation::{
  TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::StmtItem;

/// Folds `var o = {}; o.a = 1; o.b = 2;` into `var o = { a: 1, b: 2 };`.
#[derive(Default)]
pub struct ObjectPacker;

fn is_literal(expr: &Expr) -> bool {
  matches!(expr, Expr::Lit(lit) if !matches!(lit, Lit::Regex(_))) || numeric_value(expr).is_some()
}

fn property_key(prop: &MemberProp) -> Option<PropName> {
  Some(match prop {
    MemberProp::Ident(ident) => PropName::Ident(ident.clone()),
    MemberProp::Computed(computed) => match &*computed.expr {
      Expr::Lit(Lit::Str(string)) => PropName::Str(string.clone()),
      Expr::Lit(Lit::Num(number)) => PropName::Num(number.clone()),
      _ => PropName::Computed(computed.clone()),
    },
    MemberProp::PrivateName(_) => return None,
  })
}

/// The target key of `object.key = <value>`.
fn assigned_key<'a>(expr: &'a Expr, object: &Id) -> Option<(PropName, &'a Expr)> {
  let Expr::Assign(AssignExpr {
    op: AssignOp::Assign,
    left: AssignTarget::Simple(SimpleAssignTarget::Member(member)),
    right,
    ..
  }) = expr
  else {
    return None;
  };
  let target = member.obj.as_ident()?;
  if target.to_id() != *object {
    return None;
  }
  Some((property_key(&member.prop)?, right))
}

/// Properties assigned by `object.a = value;` or `object.a = object.b = literal;`.
fn assigned_properties(stmt: &Stmt, object: &Id) -> Option<Vec<Prop>> {
  let Stmt::Expr(ExprStmt { expr, .. }) = stmt else {
    return None;
  };
  let objects = HashSet::from([object.clone()]);

  let mut keys = vec![];
  let mut value = &**expr;
  while let Some((key, right)) = assigned_key(value, object) {
    if let PropName::Computed(computed) = &key {
      if references_any(computed, &objects) {
        return None;
      }
    }
    keys.push(key);
    value = right;
  }

  if keys.is_empty() || references_any(value, &objects) {
    return None;
  }
  // Chained assignments share one value, which is only safe to duplicate for literals
  if keys.len() > 1 && !is_literal(value) {
    return None;
  }

  Some(
    keys
      .into_iter()
      .map(|key| {
        Prop::KeyValue(KeyValueProp {
          key,
          value: Box::new(value.clone()),
        })
      })
      .collect(),
  )
}

struct Packer {
  objects: HashSet<Id>,
  changed: bool,
}

impl Packer {
  /// Candidate objects initialized in `var`, with the ids declared after each of them.
  fn packable_objects(&self, var: &VarDecl) -> Vec<(Id, HashSet<Id>)> {
    let mut objects = vec![];
    for (position, declarator) in var.decls.iter().enumerate() {
      let is_empty_object = matches!(
        declarator.init.as_deref(),
        Some(Expr::Object(object)) if object.props.is_empty()
      );
      let Some(binding) = declarator.name.as_ident().filter(|_| is_empty_object) else {
        continue;
      };
      let id = binding.id.to_id();
      if !self.objects.contains(&id) {
        continue;
      }
      let declared_later = var.decls[position + 1..]
        .iter()
        .filter_map(|later| later.name.as_ident())
        .map(|later| later.id.to_id())
        .collect();
      objects.push((id, declared_later));
    }
    objects
  }

  fn pack<T: StmtItem + VisitMutWith<Self>>(&mut self, items: &mut Vec<T>) {
    for item in items.iter_mut() {
      item.visit_mut_with(self);
    }

    let mut index = 0;
    while index < items.len() {
      let objects = match items[index].as_stmt() {
        Some(Stmt::Decl(Decl::Var(var))) => self.packable_objects(var),
        _ => vec![],
      };

      for (object, declared_later) in objects {
        let mut props = vec![];
        let mut consumed = 0;
        for item in &items[index + 1..] {
          let Some(assigned) = item
            .as_stmt()
            .and_then(|stmt| assigned_properties(stmt, &object))
          else {
            break;
          };
          // Declarators after the object are not yet initialized when it is created
          if assigned
            .iter()
            .any(|prop| references_any(prop, &declared_later))
          {
            break;
          }
          props.extend(assigned);
          consumed += 1;
        }
        if consumed == 0 {
          continue;
        }

        items.drain(index + 1..index + 1 + consumed);
        if let Some(Stmt::Decl(Decl::Var(var))) = items[index].as_stmt_mut() {
          let target = var.decls.iter_mut().find(|declarator| {
            declarator
              .name
              .as_ident()
              .is_some_and(|binding| binding.id.to_id() == object)
          });
          if let Some(Expr::Object(literal)) =
            target.and_then(|declarator| declarator.init.as_deref_mut())
          {
            literal
              .props
              .extend(props.into_iter().map(|prop| PropOrSpread::Prop(Box::new(prop))));
            self.changed = true;
          }
        }
      }

      index += 1;
    }
  }
}

impl VisitMut for Packer {
  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    self.pack(stmts);
  }

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    self.pack(items);
  }
}

impl Transformation for ObjectPacker {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::ObjectPacking,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let bindings = context.scope.bindings(module);
    let objects: HashSet<Id> = collect_constants(module, bindings, |expr| match expr {
      Expr::Object(object) if object.props.is_empty() => Some(()),
      _ => None,
    })
    .into_iter()
    .map(|constant| constant.id)
    .collect();
    if objects.is_empty() {
      return Ok(false);
    }

    let mut packer = Packer {
      objects,
      changed: false,
    };
    module.visit_mut_with(&mut packer);
    Ok(packer.changed)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::transformation::test_utils::{assert_transforms, assert_unchanged};

  #[test]
  fn test_packs_property_assignments() {
    assert_transforms(
      indoc! {r#"
        var o = {};
        o.a = 1;
        o['b-c'] = f();
        o[k] = 'x';
        g(o);
      "#},
      ObjectPacker,
      r#"var o = { a: 1, 'b-c': f(), [k]: 'x' }; g(o);"#,
    );
  }

  #[test]
  fn test_packs_chained_literal_assignments() {
    assert_transforms(
      "var o = {}; o.a = o.b = 'x'; g(o);",
      ObjectPacker,
      "var o = { a: 'x', b: 'x' }; g(o);",
    );
  }

  #[test]
  fn test_stops_at_self_reference() {
    assert_transforms(
      "var o = {}; o.a = 1; o.b = function () { return o.a; }; o.c = 2; g(o);",
      ObjectPacker,
      "var o = { a: 1 }; o.b = function () { return o.a; }; o.c = 2; g(o);",
    );
  }

  #[test]
  fn test_stops_at_other_statements() {
    assert_transforms(
      "function f() { var o = {}; o.a = 1; h(); o.b = 2; return o; }",
      ObjectPacker,
      "function f() { var o = { a: 1 }; h(); o.b = 2; return o; }",
    );
  }

  #[test]
  fn test_stops_at_values_declared_later() {
    assert_unchanged("var o = {}, x = 1; o.a = x; f(o.a);", ObjectPacker);
    assert_transforms(
      "var x = 1, o = {}; o.a = x; f(o.a);",
      ObjectPacker,
      "var x = 1, o = { a: x }; f(o.a);",
    );
  }

  #[test]
  fn test_skips_reassigned_objects() {
    assert_unchanged("var o = {}; o.a = 1; o = g();", ObjectPacker);
  }
}

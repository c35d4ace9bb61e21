use std::collections::HashMap;

use swc_core::ecma::ast::{Expr, Module};

use crate::binding::{collect_constants, remove_all, Binding, BindingKind, Bindings};
use crate::config::TransformationKey;
use crate::mutate::replace_reads;
use crate::transformation::{
  TransformContext, TransformError, Transformation, TransformationProperties,
};

/// Replaces aliases such as `var b = a;` with the aliased name.
#[derive(Default)]
pub struct ReassignmentRemover;

/// Whether the value of `target` can be read through an alias without observing a change.
///
/// Two single writes are tolerated: `var a; a = ...;` written before the alias is taken at
/// `alias_order`, and a function declaration that replaces itself from inside its own body,
/// as string decoders do on their first call.
fn is_stable_target(target: &Binding, alias_order: usize, bindings: &Bindings) -> bool {
  if target.exported || target.declarations != 1 {
    return false;
  }
  if target.is_constant() {
    return true;
  }

  let [write] = target.writes.as_slice() else {
    return false;
  };
  match target.kind {
    BindingKind::Var { has_init: false } => write.order < alias_order,
    BindingKind::Function => target
      .owner
      .is_some_and(|owner| bindings.is_within(write.function, owner)),
    _ => false,
  }
}

impl Transformation for ReassignmentRemover {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::ReassignmentRemoval,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let bindings = context.scope.bindings(module);
    let aliases = collect_constants(module, bindings, |expr| match expr {
      Expr::Ident(ident) => Some(ident.clone()),
      _ => None,
    });

    let aliases: Vec<_> = aliases
      .into_iter()
      .filter(|alias| alias.id != alias.expression.to_id())
      .filter(|alias| {
        let Some(alias_binding) = alias.binding(bindings) else {
          return false;
        };
        let alias_order = alias_binding
          .writes
          .first()
          .or(alias_binding.declared_at.as_ref())
          .map_or(0, |site| site.order);
        bindings.get(&alias.expression.to_id()).is_some_and(|target| {
          target.is_declared() && is_stable_target(target, alias_order, bindings)
        })
      })
      .collect();

    // An alias of an alias is handled in the next sweep, once its target is gone
    let replacements: HashMap<_, _> = aliases
      .iter()
      .map(|alias| (alias.id.clone(), alias.expression.clone()))
      .collect();
    let aliases: Vec<_> = aliases
      .into_iter()
      .filter(|alias| !replacements.contains_key(&alias.expression.to_id()))
      .collect();
    if aliases.is_empty() {
      return Ok(false);
    }

    let replacements = aliases
      .iter()
      .map(|alias| (alias.id.clone(), Expr::Ident(alias.expression.clone())))
      .collect();
    replace_reads(module, replacements);
    remove_all(module, &aliases);

    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::transformation::test_utils::{assert_transforms, assert_unchanged};

  #[test]
  fn test_replaces_alias() {
    assert_transforms(
      "var a = g(); var b = a; f(b, b);",
      ReassignmentRemover,
      "var a = g(); f(a, a);",
    );
  }

  #[test]
  fn test_skips_reassigned_target() {
    assert_unchanged("var a = g(); var b = a; a = 2; f(b);", ReassignmentRemover);
  }

  #[test]
  fn test_skips_globals() {
    assert_unchanged("var w = window; f(w);", ReassignmentRemover);
  }

  #[test]
  fn test_allows_declared_then_assigned_target() {
    assert_transforms(
      "var a; a = g(); var b = a; f(b);",
      ReassignmentRemover,
      "var a; a = g(); f(a);",
    );
  }

  #[test]
  fn test_skips_alias_taken_before_assignment() {
    assert_unchanged("var a; var b = a; a = g(); f(b);", ReassignmentRemover);
  }

  #[test]
  fn test_allows_self_replacing_function() {
    assert_transforms(
      indoc! {r#"
        function decode(x) {
          decode = function (y) { return y; };
          return decode(x);
        }
        (function (w) {
          w(1);
        })(decode);
        var d = decode;
        d(2);
      "#},
      ReassignmentRemover,
      indoc! {r#"
        function decode(x) {
          decode = function (y) { return y; };
          return decode(x);
        }
        (function (w) {
          w(1);
        })(decode);
        decode(2);
      "#},
    );
  }

  #[test]
  fn test_chains_resolve_one_link_per_run() {
    assert_transforms(
      "var a = g(); var b = a; var c = b; f(c);",
      ReassignmentRemover,
      "var a = g(); var c = a; f(c);",
    );
  }
}

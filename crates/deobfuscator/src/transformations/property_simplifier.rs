use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

use crate::config::TransformationKey;
use crate::transformation::{
  TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::{is_valid_identifier_name, number_to_string, string_to_number};

/// Turns `obj["name"]` into `obj.name` and quoted or computed keys into plain keys.
#[derive(Default)]
pub struct PropertySimplifier {
  changed: bool,
}

/// Keys whose meaning changes when a computed key becomes a literal one.
const COMPUTED_ONLY: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// The number a string key spells, when the number prints back as the same key.
fn canonical_index(key: &str) -> Option<f64> {
  let value = string_to_number(key);
  (value.is_finite() && value >= 0.0 && number_to_string(value) == key).then_some(value)
}

fn literal_key(string: &Str) -> PropName {
  if is_valid_identifier_name(&string.value) {
    PropName::Ident(IdentName::new(string.value.clone(), string.span))
  } else if let Some(value) = canonical_index(&string.value) {
    PropName::Num(Number {
      span: string.span,
      value,
      raw: None,
    })
  } else {
    PropName::Str(string.clone())
  }
}

fn simplify_prop_name(name: &PropName) -> Option<PropName> {
  match name {
    PropName::Str(string) => {
      let simplified = literal_key(string);
      (!matches!(simplified, PropName::Str(_))).then_some(simplified)
    }
    PropName::Computed(computed) => match &*computed.expr {
      Expr::Lit(Lit::Str(string)) if !COMPUTED_ONLY.contains(&&*string.value) => {
        Some(literal_key(string))
      }
      Expr::Lit(Lit::Num(number)) if number.value.is_finite() && number.value >= 0.0 => {
        Some(PropName::Num(number.clone()))
      }
      _ => None,
    },
    _ => None,
  }
}

/// `.name` for a computed `["name"]` access
fn simplify_computed_access(computed: &ComputedPropName) -> Option<IdentName> {
  let Expr::Lit(Lit::Str(string)) = &*computed.expr else {
    return None;
  };
  is_valid_identifier_name(&string.value)
    .then(|| IdentName::new(string.value.clone(), string.span))
}

impl VisitMut for PropertySimplifier {
  fn visit_mut_member_prop(&mut self, prop: &mut MemberProp) {
    prop.visit_mut_children_with(self);

    if let MemberProp::Computed(computed) = prop {
      if let Some(name) = simplify_computed_access(computed) {
        *prop = MemberProp::Ident(name);
        self.changed = true;
      }
    }
  }

  fn visit_mut_super_prop(&mut self, prop: &mut SuperProp) {
    prop.visit_mut_children_with(self);

    if let SuperProp::Computed(computed) = prop {
      if let Some(name) = simplify_computed_access(computed) {
        *prop = SuperProp::Ident(name);
        self.changed = true;
      }
    }
  }

  fn visit_mut_prop_name(&mut self, name: &mut PropName) {
    name.visit_mut_children_with(self);

    if let Some(simplified) = simplify_prop_name(name) {
      *name = simplified;
      self.changed = true;
    }
  }
}

impl Transformation for PropertySimplifier {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::PropertySimplification,
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

//! Replaces calls of string table wrappers with the strings they return.
//!
//! For every table the pass finds the functions reading it, works out how each of them decodes
//! entries, replays the rotation of the table when there is one, and replaces every wrapper
//! call with a string literal. The table, its wrappers and the rotation are removed only when
//! every call could be replaced. Otherwise they stay, along with the calls that were resolved.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::config::TransformationKey;
use crate::matchers::numeric_value;
use crate::mutate::{remove_declarations, remove_statements};
use crate::transformation::{
  Outcome, TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::str_expr;

pub mod decoder;
pub mod rotation;
pub mod wrapper;

use decoder::{DecoderKind, StringDecoder};
use rotation::Rotation;
use wrapper::{array_table_decoder, function_table_decoder, StringTable, TableSource, WrapperError};

#[derive(Default)]
pub struct StringRevealer {
  changed: bool,
}

/// Collects every string table of the module.
#[derive(Default)]
struct TableFinder {
  tables: Vec<StringTable>,
}

impl Visit for TableFinder {
  fn visit_fn_decl(&mut self, function: &FnDecl) {
    if let Some(table) = StringTable::from_function(function) {
      self.tables.push(table);
    }
    function.visit_children_with(self);
  }

  fn visit_var_declarator(&mut self, declarator: &VarDeclarator) {
    if let Some(table) = StringTable::from_declarator(declarator) {
      self.tables.push(table);
    }
    declarator.visit_children_with(self);
  }
}

enum Frame {
  Declaration(Id),
  Other,
}

/// Sorts the references of one table into wrappers and the rotation call.
struct TableReferences<'a> {
  table: &'a StringTable,
  frames: Vec<Frame>,
  wrappers: IndexSet<Id>,
  rotation: Option<Rotation>,
  unknown: bool,
}

impl TableReferences<'_> {
  fn is_table(&self, expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(ident) if ident.to_id() == self.table.id)
  }

  /// Inside the table function itself
  fn is_internal(&self) -> bool {
    self
      .frames
      .iter()
      .any(|frame| matches!(frame, Frame::Declaration(id) if *id == self.table.id))
  }

  /// Record the function declaration the reference is directly in as a wrapper.
  fn add_wrapper(&mut self, expected: TableSource) {
    match self.frames.last() {
      Some(Frame::Declaration(id)) if self.table.source == expected => {
        self.wrappers.insert(id.clone());
      }
      _ => self.unknown = true,
    }
  }
}

impl Visit for TableReferences<'_> {
  fn visit_fn_decl(&mut self, function: &FnDecl) {
    self.frames.push(Frame::Declaration(function.ident.to_id()));
    function.function.visit_children_with(self);
    self.frames.pop();
  }

  fn visit_function(&mut self, function: &Function) {
    self.frames.push(Frame::Other);
    function.visit_children_with(self);
    self.frames.pop();
  }

  fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
    self.frames.push(Frame::Other);
    arrow.visit_children_with(self);
    self.frames.pop();
  }

  fn visit_call_expr(&mut self, call: &CallExpr) {
    if let Callee::Expr(callee) = &call.callee {
      if self.is_table(callee) {
        if !self.is_internal() {
          self.add_wrapper(TableSource::Function);
        }
        call.args.visit_with(self);
        return;
      }
    }

    if let Some(rotation) = Rotation::from_call(call, &self.table.id) {
      if self.rotation.is_some() {
        self.unknown = true;
      }
      self.rotation = Some(rotation);
      call.callee.visit_with(self);
      for arg in &call.args[1..] {
        arg.visit_with(self);
      }
      return;
    }

    call.visit_children_with(self);
  }

  fn visit_member_expr(&mut self, member: &MemberExpr) {
    if self.is_table(&member.obj) && matches!(member.prop, MemberProp::Computed(_)) {
      if !self.is_internal() {
        self.add_wrapper(TableSource::Array);
      }
      member.prop.visit_with(self);
      return;
    }
    member.visit_children_with(self);
  }

  fn visit_expr(&mut self, expr: &Expr) {
    if self.is_table(expr) {
      if !self.is_internal() {
        self.unknown = true;
      }
      return;
    }
    expr.visit_children_with(self);
  }
}

/// Copies of the function declarations with the given names
struct FunctionFinder<'a> {
  ids: &'a IndexSet<Id>,
  found: IndexMap<Id, FnDecl>,
}

impl Visit for FunctionFinder<'_> {
  fn visit_fn_decl(&mut self, function: &FnDecl) {
    let id = function.ident.to_id();
    if self.ids.contains(&id) {
      self.found.insert(id, function.clone());
    }
    function.visit_children_with(self);
  }
}

/// Replaces wrapper calls outside of the table machinery.
struct WrapperCallReplacer<'a> {
  table: &'a StringTable,
  strings: &'a [String],
  decoders: &'a IndexMap<Id, StringDecoder>,
  replaced: usize,
  failed: bool,
}

impl WrapperCallReplacer<'_> {
  fn decode(&self, decoder: &StringDecoder, args: &[ExprOrSpread]) -> Option<String> {
    if args.iter().any(|arg| arg.spread.is_some()) {
      return None;
    }
    let (index, key) = match (decoder.kind, args) {
      (DecoderKind::Rc4, [index, key]) => match &*key.expr {
        Expr::Lit(Lit::Str(key)) => (&index.expr, Some(&*key.value)),
        _ => return None,
      },
      (DecoderKind::Rc4, _) => return None,
      (_, [index]) | (_, [index, _]) => (&index.expr, None),
      _ => return None,
    };
    decoder.decode(self.strings, numeric_value(index)?, key)
  }
}

impl VisitMut for WrapperCallReplacer<'_> {
  fn visit_mut_fn_decl(&mut self, function: &mut FnDecl) {
    let id = function.ident.to_id();
    if self.decoders.contains_key(&id) || id == self.table.id {
      return;
    }
    function.visit_mut_children_with(self);
  }

  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    if Rotation::is_call_of(expr, &self.table.id) {
      return;
    }

    match expr {
      Expr::Call(call) => {
        let decoder = match &call.callee {
          Callee::Expr(callee) => match &**callee {
            Expr::Ident(ident) => self.decoders.get(&ident.to_id()),
            _ => None,
          },
          _ => None,
        };
        let Some(decoder) = decoder else {
          call.visit_mut_children_with(self);
          return;
        };

        match self.decode(decoder, &call.args) {
          Some(value) => {
            *expr = str_expr(&value);
            self.replaced += 1;
          }
          None => {
            self.failed = true;
            call.args.visit_mut_with(self);
          }
        }
      }
      Expr::Ident(ident) if self.decoders.contains_key(&ident.to_id()) => self.failed = true,
      _ => expr.visit_mut_children_with(self),
    }
  }
}

/// Drops the raw text of string literals written with `\x` or `\u` escapes so that they are
/// printed with their characters.
#[derive(Default)]
struct EscapeNormalizer {
  normalized: usize,
}

impl VisitMut for EscapeNormalizer {
  fn visit_mut_str(&mut self, string: &mut Str) {
    let Some(raw) = &string.raw else {
      return;
    };
    if !raw.contains("\\x") && !raw.contains("\\u") {
      return;
    }
    if string.value.chars().any(char::is_control) {
      return;
    }
    let unquoted = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();
    if unquoted != &*string.value {
      string.raw = None;
      self.normalized += 1;
    }
  }
}

impl StringRevealer {
  /// Resolve every wrapper call of `table`. Returns whether the module changed.
  fn reveal(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
    table: StringTable,
  ) -> bool {
    let name = table.id.0.clone();

    let mut references = TableReferences {
      table: &table,
      frames: vec![],
      wrappers: IndexSet::new(),
      rotation: None,
      unknown: false,
    };
    module.visit_with(&mut references);
    let TableReferences {
      wrappers,
      rotation,
      unknown,
      ..
    } = references;

    // An array nothing reads through a wrapper is not a string table
    if wrappers.is_empty() && rotation.is_none() {
      return false;
    }
    if unknown {
      context.report(Outcome::Skipped(format!(
        "{} {}",
        WrapperError::UnknownShape,
        name
      )));
      return false;
    }
    if wrappers.is_empty() {
      context.report(Outcome::Skipped(format!(
        "No wrapper functions found for string table {}",
        name
      )));
      return false;
    }

    let mut finder = FunctionFinder {
      ids: &wrappers,
      found: IndexMap::new(),
    };
    module.visit_with(&mut finder);

    let mut decoders = IndexMap::new();
    for (id, function) in &finder.found {
      let decoder = match table.source {
        TableSource::Function => function_table_decoder(&context.source_map, function, &table.id),
        TableSource::Array => array_table_decoder(&context.source_map, function, &table.id),
      };
      match decoder {
        Ok(decoder) => {
          tracing::debug!(
            wrapper = %id.0,
            kind = ?decoder.kind,
            offset = decoder.offset,
            "String table wrapper"
          );
          decoders.insert(id.clone(), decoder);
        }
        Err(error) => {
          context.report(Outcome::Skipped(format!("{} {}", error, name)));
          return false;
        }
      }
    }
    if decoders.len() != wrappers.len() {
      context.report(Outcome::Skipped(format!(
        "{} {}",
        WrapperError::UnknownShape,
        name
      )));
      return false;
    }

    let mut strings = table.strings.clone();
    if let Some(rotation) = &rotation {
      if !rotation.simulate(&mut strings, &decoders, context.unresolved_mark) {
        context.report(Outcome::Failed(format!(
          "No rotation of string table {} matches {}",
          name, rotation.stop
        )));
        return false;
      }
    }

    let mut replacer = WrapperCallReplacer {
      table: &table,
      strings: &strings,
      decoders: &decoders,
      replaced: 0,
      failed: false,
    };
    module.visit_mut_with(&mut replacer);
    let WrapperCallReplacer {
      replaced, failed, ..
    } = replacer;

    if failed {
      context.report(Outcome::Failed(format!(
        "Could not replace every call of the wrappers of string table {}",
        name
      )));
      return replaced > 0;
    }

    let mut ids: HashSet<Id> = decoders.keys().cloned().collect();
    ids.insert(table.id.clone());
    remove_declarations(module, &ids);
    if rotation.is_some() {
      remove_statements(module, |stmt| {
        matches!(stmt, Stmt::Expr(ExprStmt { expr, .. }) if Rotation::is_call_of(expr, &table.id))
      });
    }

    context.report(Outcome::Matched(format!(
      "Revealed {} strings of table {}",
      replaced, name
    )));
    true
  }
}

impl Transformation for StringRevealer {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::StringRevealing,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let mut finder = TableFinder::default();
    module.visit_with(&mut finder);
    for table in finder.tables {
      if self.reveal(module, context, table) {
        self.changed = true;
      }
    }

    let mut normalizer = EscapeNormalizer::default();
    module.visit_mut_with(&mut normalizer);
    if normalizer.normalized > 0 {
      self.changed = true;
    }

    Ok(self.changed)
  }
}

#[cfg(test)]
mod tests {
  use indoc::{formatdoc, indoc};
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::transformation::test_utils::{
    assert_transforms, assert_unchanged, run_test_transformation,
  };

  const TABLE: &str = indoc! {r#"
    function table() {
      var strings = ["foo", "bar", "baz"];
      table = function () {
        return strings;
      };
      return table();
    }
  "#};

  const BASIC_WRAPPER: &str = indoc! {r#"
    function wrapper(a, b) {
      var strings = table();
      wrapper = function (index, key) {
        index = index - 0x64;
        var value = strings[index];
        return value;
      };
      return wrapper(a, b);
    }
  "#};

  #[test]
  fn test_reveals_basic_table() {
    assert_transforms(
      &formatdoc! {r#"
        {TABLE}
        {BASIC_WRAPPER}
        console.log(wrapper(0x64), wrapper(102) + wrapper(101));
      "#},
      StringRevealer::default(),
      r#"console.log("foo", "baz" + "bar");"#,
    );
  }

  #[test]
  fn test_unmatched_rotation_leaves_table() {
    let run = run_test_transformation(
      &formatdoc! {r#"
        {TABLE}
        {BASIC_WRAPPER}
        (function (t, stop) {{
          var s = t();
          while (true) {{
            try {{
              var v = parseInt(wrapper(0x64).length) + 1;
              if (v === stop) break;
              else s.push(s.shift());
            }} catch (e) {{
              s.push(s.shift());
            }}
          }}
        }})(table, 4);
        f(wrapper(100));
      "#},
      StringRevealer::default(),
    );
    // `.length` cannot be evaluated
    assert!(!run.changed);
    assert_eq!(run.diagnostics.len(), 1);
  }

  #[test]
  fn test_rotation_shifts_indices() {
    assert_transforms(
      &formatdoc! {r#"
        function table() {{
          var strings = "x|1|2|y".split("|");
          table = function () {{
            return strings;
          }};
          return table();
        }}
        {BASIC_WRAPPER}
        (function (t, stop) {{
          var s = t();
          while (true) {{
            try {{
              var v = -parseInt(wrapper(0x64)) + parseInt(wrapper(0x65)) * 2;
              if (v === stop) break;
              else s.push(s.shift());
            }} catch (e) {{
              s.push(s.shift());
            }}
          }}
        }})(table, 3);
        f(wrapper(100), wrapper(103));
      "#},
      StringRevealer::default(),
      r#"f("1", "x");"#,
    );
  }

  #[test]
  fn test_reveals_array_table() {
    assert_transforms(
      indoc! {r#"
        var table = ["Bg9N", "y29UC29Szq"];
        function wrapper(index) {
          index = index - 0;
          var value = table[index];
          if (wrapper.init === undefined) {
            wrapper.decode = function (s) {
              return "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/=".indexOf(s);
            };
            wrapper.init = true;
          }
          var cached = wrapper.cache[index];
          if (!cached) {
            value = wrapper.decode(value);
          }
          return value;
        }
        window[wrapper(1)][wrapper(0)]("hi");
      "#},
      StringRevealer::default(),
      r#"window["console"]["log"]("hi");"#,
    );
  }

  #[test]
  fn test_keeps_table_on_partial_failure() {
    let run = run_test_transformation(
      &formatdoc! {r#"
        {TABLE}
        {BASIC_WRAPPER}
        f(wrapper(100), wrapper(x), wrapper(500));
      "#},
      StringRevealer::default(),
    );
    assert!(run.changed);
    assert!(run.output_code.contains("function table()"));
    assert!(run.output_code.contains("function wrapper("));
    assert!(run.output_code.contains(r#"f("foo", wrapper(x), wrapper(500))"#));
    assert!(matches!(
      run.diagnostics.last().map(|diagnostic| &diagnostic.outcome),
      Some(Outcome::Failed(_))
    ));
  }

  #[test]
  fn test_out_of_range_index_fails_only_that_call() {
    let run = run_test_transformation(
      &formatdoc! {r#"
        {TABLE}
        {BASIC_WRAPPER}
        f(wrapper(100), wrapper(-1e19), wrapper(1e19));
      "#},
      StringRevealer::default(),
    );
    assert!(run.changed);
    assert!(run
      .output_code
      .contains(r#"f("foo", wrapper(-1e19), wrapper(1e19))"#));
  }

  #[test]
  fn test_skips_unknown_table_references() {
    let code = formatdoc! {r#"
      {TABLE}
      {BASIC_WRAPPER}
      g(table);
      f(wrapper(100));
    "#};
    let run = run_test_transformation(&code, StringRevealer::default());
    assert!(!run.changed);
    assert_eq!(
      run.diagnostics[0].outcome,
      Outcome::Skipped("Unknown reference to string table table".into())
    );
  }

  #[test]
  fn test_normalizes_escaped_literals() {
    assert_transforms(
      r#"a("\x68\x65\x6c\x6c\x6f", "A", "\n", 'plain');"#,
      StringRevealer::default(),
      r#"a("hello", "A", "\n", 'plain');"#,
    );
    assert_unchanged(r#"a("\x00", 'x');"#, StringRevealer::default());
  }
}

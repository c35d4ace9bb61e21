use std::string::FromUtf8Error;
use swc_core::common::input::StringInput;
use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, Globals, Mark, SourceMap, GLOBALS};
use swc_core::ecma::ast::{Module, ModuleItem, Program, Stmt};
use swc_core::ecma::codegen::text_writer::JsWriter;
use swc_core::ecma::parser::lexer::Lexer;
use swc_core::ecma::parser::Parser;
use swc_core::ecma::transforms::base::fixer::{fixer, paren_remover};
use swc_core::ecma::transforms::base::hygiene::hygiene;
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

pub struct RunContext {
  /// Source-map in use
  pub source_map: Lrc<SourceMap>,
  /// Global mark from SWC resolver
  pub global_mark: Mark,
  /// Unresolved mark from SWC resolver
  pub unresolved_mark: Mark,
}

/// Options for a single parse/transform/emit run.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
  /// Name recorded in the source map, `anonymous` when absent
  pub file_name: Option<String>,
  /// Build a source map alongside the output code
  pub source_map: bool,
}

pub struct RunVisitResult<V> {
  pub output_code: String,
  #[allow(unused)]
  pub visitor: V,
  pub source_map: Option<Vec<u8>>,
}

/// Runner of SWC visitors
///
/// * Parse `code` with SWC
/// * Run a visitor over it
/// * Return the result
///
pub fn run_visit<V: VisitMut>(
  code: &str,
  make_visit: impl FnOnce(RunContext) -> V,
) -> Result<RunVisitResult<V>, RunError> {
  let (output_code, visitor, source_map) = run_with_transformation(
    code,
    &RunOptions::default(),
    |run_context: RunContext, module: &mut Module| {
      let mut visit = make_visit(run_context);
      module.visit_mut_with(&mut visit);
      visit
    },
  )?;
  Ok(RunVisitResult {
    output_code,
    visitor,
    source_map,
  })
}

/// Same as `run_visit` but for `Visit` instead of `VisitMut`
pub fn run_visit_const<V: Visit>(
  code: &str,
  make_visit: impl FnOnce(RunContext) -> V,
) -> Result<RunVisitResult<V>, RunError> {
  let (output_code, visitor, source_map) = run_with_transformation(
    code,
    &RunOptions::default(),
    |run_context: RunContext, module: &mut Module| {
      let mut visit = make_visit(run_context);
      module.visit_with(&mut visit);
      visit
    },
  )?;
  Ok(RunVisitResult {
    output_code,
    visitor,
    source_map,
  })
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
  #[error("Failed to parse source: {0:?}")]
  SwcParse(swc_core::ecma::parser::error::Error),
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid utf-8 output: {0}")]
  InvalidUtf8Output(#[from] FromUtf8Error),
  #[error("Failed to generate source map")]
  SourceMap(#[from] sourcemap::Error),
}

pub type RunWithTransformationOutput<R> = (String, R, Option<Vec<u8>>);

/// Parse code, run resolver over it, then run the `transform` function with the parsed module.
///
/// Scripts are converted into modules made of plain statements so that transforms only deal
/// with one root type. After `transform` returns the module is renamed by `hygiene`, wrapped in
/// parentheses where needed by `fixer` and printed.
pub fn run_with_transformation<R>(
  code: &str,
  options: &RunOptions,
  transform: impl FnOnce(RunContext, &mut Module) -> R,
) -> Result<RunWithTransformationOutput<R>, RunError> {
  let source_map = Lrc::new(SourceMap::default());
  let file_name = match &options.file_name {
    Some(name) => FileName::Custom(name.clone()),
    None => FileName::Anon,
  };
  let mut module = parse_module(&source_map, file_name, code)?;

  GLOBALS.set(
    &Globals::new(),
    || -> Result<RunWithTransformationOutput<R>, RunError> {
      let global_mark = Mark::new();
      let unresolved_mark = Mark::new();
      module.visit_mut_with(&mut resolver(unresolved_mark, global_mark, false));
      module.visit_mut_with(&mut paren_remover(None));

      let context = RunContext {
        source_map: source_map.clone(),
        global_mark,
        unresolved_mark,
      };
      let result = transform(context, &mut module);

      module.visit_mut_with(&mut hygiene());
      module.visit_mut_with(&mut fixer(None));

      let (output_code, output_map) = emit_module(&source_map, &module, options.source_map)?;
      Ok((output_code, result, output_map))
    },
  )
}

/// Parse `code` as either a script or a module.
pub fn parse_module(
  source_map: &Lrc<SourceMap>,
  file_name: FileName,
  code: &str,
) -> Result<Module, RunError> {
  let source_file = source_map.new_source_file(Lrc::new(file_name), code.into());

  let lexer = Lexer::new(
    Default::default(),
    Default::default(),
    StringInput::from(&*source_file),
    None,
  );

  let mut parser = Parser::new_from(lexer);
  let program = parser.parse_program().map_err(RunError::SwcParse)?;

  Ok(match program {
    Program::Module(module) => module,
    Program::Script(script) => Module {
      span: script.span,
      shebang: script.shebang,
      body: script.body.into_iter().map(ModuleItem::Stmt).collect(),
    },
  })
}

/// Print `module`, optionally producing a source map.
pub fn emit_module(
  source_map: &Lrc<SourceMap>,
  module: &Module,
  with_source_map: bool,
) -> Result<(String, Option<Vec<u8>>), RunError> {
  let mut line_pos_buffer = vec![];
  let mut output_buffer = vec![];
  let writer = JsWriter::new(
    source_map.clone(),
    "\n",
    &mut output_buffer,
    if with_source_map {
      Some(&mut line_pos_buffer)
    } else {
      None
    },
  );
  let mut emitter = swc_core::ecma::codegen::Emitter {
    cfg: Default::default(),
    cm: source_map.clone(),
    comments: None,
    wr: writer,
  };
  emitter.emit_module(module)?;
  let output_code = String::from_utf8(output_buffer)?;

  if !with_source_map {
    return Ok((output_code, None));
  }

  let source_map = source_map.build_source_map(&line_pos_buffer);
  let mut output_map_buffer = vec![];
  source_map.to_writer(&mut output_map_buffer)?;
  Ok((output_code, Some(output_map_buffer)))
}

/// Print a single statement outside of any module, e.g. to match its text against a regex.
///
/// The statement is cloned and parenthesised by `fixer` so the text is always valid source.
pub fn print_stmt(source_map: &Lrc<SourceMap>, stmt: &Stmt) -> Result<String, RunError> {
  let mut module = Module {
    span: Default::default(),
    body: vec![ModuleItem::Stmt(stmt.clone())],
    shebang: None,
  };
  module.visit_mut_with(&mut fixer(None));
  let (code, _) = emit_module(source_map, &module, false)?;
  Ok(code)
}

#[cfg(test)]
mod tests {
  use swc_core::ecma::ast::{Lit, Str};
  use swc_core::ecma::visit::VisitMut;

  use super::*;

  #[test]
  fn test_example() {
    struct Visitor;
    impl VisitMut for Visitor {
      fn visit_mut_lit(&mut self, n: &mut Lit) {
        *n = Lit::Str(Str::from("replacement"));
      }
    }

    let code = r#"console.log('test!')"#;
    let RunVisitResult { output_code, .. } = run_visit(code, |_: RunContext| Visitor).unwrap();
    assert_eq!(
      output_code,
      r#"console.log("replacement");
"#
    );
  }

  #[test]
  fn test_script_is_accepted() {
    let code = r#"a = 1; b();"#;
    let RunVisitResult { output_code, .. } =
      run_visit_const(code, |_: RunContext| NoopVisit).unwrap();
    assert_eq!(output_code, "a = 1;\nb();\n");
  }

  #[test]
  fn test_module_is_accepted() {
    let code = r#"import a from 'a'; export default a;"#;
    let RunVisitResult { output_code, .. } =
      run_visit_const(code, |_: RunContext| NoopVisit).unwrap();
    assert!(output_code.contains("export default a"));
  }

  #[test]
  fn test_parse_error() {
    let result = run_visit_const("var = ;", |_: RunContext| NoopVisit);
    assert!(matches!(result, Err(RunError::SwcParse(_))));
  }

  #[test]
  fn test_source_map_is_emitted_on_request() {
    let options = RunOptions {
      file_name: Some("input.js".into()),
      source_map: true,
    };
    let (_, _, source_map) =
      run_with_transformation("var a = 1;\nf(a);", &options, |_, _| ()).unwrap();
    let source_map = String::from_utf8(source_map.unwrap()).unwrap();
    assert!(source_map.contains("input.js"));
  }

  #[test]
  fn test_print_stmt() {
    let source_map = Lrc::new(SourceMap::default());
    let module = parse_module(&source_map, FileName::Anon, "function f() { return 1; }").unwrap();
    let ModuleItem::Stmt(stmt) = &module.body[0] else {
      panic!("expected a statement");
    };
    let code = print_stmt(&source_map, stmt).unwrap();
    assert!(code.starts_with("function f()"));
  }

  struct NoopVisit;
  impl Visit for NoopVisit {}
}

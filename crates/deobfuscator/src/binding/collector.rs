use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitWith};

use super::{Binding, BindingKind, Bindings, FnIdx, Site, PROGRAM};

/// Walk `module` once and record every declaration, read and write.
pub fn collect_bindings(module: &Module) -> Bindings {
  let mut collector = BindingCollector {
    bindings: Bindings {
      map: Default::default(),
      function_parents: vec![None],
      function_starts: vec![0],
    },
    frames: vec![Frame {
      index: PROGRAM,
      depth: 0,
    }],
    order: 0,
    pattern: None,
    exporting: false,
  };
  module.visit_with(&mut collector);
  collector.bindings
}

struct Frame {
  index: FnIdx,
  /// Statement nesting inside the function body
  depth: usize,
}

#[derive(Clone, Copy)]
enum PatternMode {
  Declare {
    kind: BindingKind,
    destructured: bool,
  },
  Write,
}

struct BindingCollector {
  bindings: Bindings,
  frames: Vec<Frame>,
  order: usize,
  pattern: Option<PatternMode>,
  exporting: bool,
}

impl BindingCollector {
  fn site(&mut self) -> Site {
    self.order += 1;
    let frame = self.frames.last();
    Site {
      order: self.order,
      function: frame.map_or(PROGRAM, |frame| frame.index),
      direct: frame.is_some_and(|frame| frame.depth == 1),
    }
  }

  fn current_function(&self) -> FnIdx {
    self.frames.last().map_or(PROGRAM, |frame| frame.index)
  }

  fn binding(&mut self, ident: &Ident) -> &mut Binding {
    let id = ident.to_id();
    self
      .bindings
      .map
      .entry(id.clone())
      .or_insert_with(|| Binding::new(id))
  }

  fn declare(&mut self, ident: &Ident, kind: BindingKind, owner: Option<FnIdx>) {
    let site = self.site();
    let exported = self.exporting;
    let binding = self.binding(ident);
    binding.kind = kind;
    binding.declarations += 1;
    if binding.declared_at.is_none() {
      binding.declared_at = Some(site);
    }
    if owner.is_some() {
      binding.owner = owner;
    }
    binding.exported |= exported;
  }

  fn read(&mut self, ident: &Ident) {
    let site = self.site();
    self.binding(ident).reads.push(site);
  }

  fn write(&mut self, ident: &Ident) {
    let site = self.site();
    self.binding(ident).writes.push(site);
  }

  fn with_pattern(&mut self, mode: Option<PatternMode>, visit: impl FnOnce(&mut Self)) {
    let previous = std::mem::replace(&mut self.pattern, mode);
    visit(self);
    self.pattern = previous;
  }

  fn pattern_ident(&mut self, ident: &Ident) {
    match self.pattern {
      Some(PatternMode::Declare { kind, destructured }) => {
        let owner = (kind == BindingKind::Param).then(|| self.current_function());
        self.declare(ident, kind, owner);
        if destructured {
          self.write(ident);
        }
      }
      Some(PatternMode::Write) => self.write(ident),
      None => {}
    }
  }

  /// Enter a new function, returning its index.
  fn enter_function(&mut self) -> FnIdx {
    let index = self.bindings.function_parents.len();
    let parent = self.current_function();
    self.bindings.function_parents.push(Some(parent));
    self.bindings.function_starts.push(self.order);
    self.frames.push(Frame { index, depth: 0 });
    index
  }

  fn exit_function(&mut self) {
    self.frames.pop();
  }

  fn next_function(&self) -> FnIdx {
    self.bindings.function_parents.len()
  }

  fn declare_var(&mut self, var: &VarDecl, is_loop_head: bool) {
    let kind = |has_init: bool| match var.kind {
      VarDeclKind::Var => BindingKind::Var { has_init },
      VarDeclKind::Let => BindingKind::Let,
      VarDeclKind::Const => BindingKind::Const,
    };

    for declarator in &var.decls {
      let mode = PatternMode::Declare {
        kind: kind(declarator.init.is_some()),
        destructured: is_loop_head || !declarator.name.is_ident(),
      };
      self.with_pattern(Some(mode), |this| declarator.name.visit_with(this));
      let exporting = std::mem::replace(&mut self.exporting, false);
      declarator.init.visit_with(self);
      self.exporting = exporting;
    }
  }
}

impl Visit for BindingCollector {
  fn visit_stmt(&mut self, stmt: &Stmt) {
    if let Some(frame) = self.frames.last_mut() {
      frame.depth += 1;
    }
    stmt.visit_children_with(self);
    if let Some(frame) = self.frames.last_mut() {
      frame.depth -= 1;
    }
  }

  fn visit_expr(&mut self, expr: &Expr) {
    match expr {
      Expr::Ident(ident) => self.read(ident),
      _ => self.with_pattern(None, |this| expr.visit_children_with(this)),
    }
  }

  fn visit_prop(&mut self, prop: &Prop) {
    match prop {
      Prop::Shorthand(ident) => self.read(ident),
      _ => prop.visit_children_with(self),
    }
  }

  fn visit_pat(&mut self, pat: &Pat) {
    match pat {
      Pat::Ident(binding) => self.pattern_ident(&binding.id),
      Pat::Expr(expr) => self.with_pattern(None, |this| expr.visit_with(this)),
      Pat::Assign(assign) => {
        assign.left.visit_with(self);
        self.with_pattern(None, |this| assign.right.visit_with(this));
      }
      _ => pat.visit_children_with(self),
    }
  }

  fn visit_prop_name(&mut self, name: &PropName) {
    if let PropName::Computed(computed) = name {
      self.with_pattern(None, |this| computed.expr.visit_with(this));
    }
  }

  fn visit_assign_pat_prop(&mut self, prop: &AssignPatProp) {
    self.pattern_ident(&prop.key.id);
    self.with_pattern(None, |this| prop.value.visit_with(this));
  }

  fn visit_var_decl(&mut self, var: &VarDecl) {
    self.declare_var(var, false);
  }

  fn visit_fn_decl(&mut self, decl: &FnDecl) {
    let owner = self.next_function();
    self.declare(&decl.ident, BindingKind::Function, Some(owner));
    let exporting = std::mem::replace(&mut self.exporting, false);
    decl.function.visit_with(self);
    self.exporting = exporting;
  }

  fn visit_fn_expr(&mut self, expr: &FnExpr) {
    if let Some(ident) = &expr.ident {
      let owner = self.next_function();
      self.declare(ident, BindingKind::FunctionExpressionName, Some(owner));
    }
    expr.function.visit_with(self);
  }

  fn visit_function(&mut self, function: &Function) {
    self.enter_function();
    function.visit_children_with(self);
    self.exit_function();
  }

  fn visit_param(&mut self, param: &Param) {
    let mode = PatternMode::Declare {
      kind: BindingKind::Param,
      destructured: !param.pat.is_ident(),
    };
    self.with_pattern(Some(mode), |this| param.pat.visit_with(this));
  }

  fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
    self.enter_function();
    for param in &arrow.params {
      let mode = PatternMode::Declare {
        kind: BindingKind::Param,
        destructured: !param.is_ident(),
      };
      self.with_pattern(Some(mode), |this| param.visit_with(this));
    }
    arrow.body.visit_with(self);
    self.exit_function();
  }

  fn visit_constructor(&mut self, constructor: &Constructor) {
    self.enter_function();
    constructor.visit_children_with(self);
    self.exit_function();
  }

  fn visit_getter_prop(&mut self, getter: &GetterProp) {
    getter.key.visit_with(self);
    self.enter_function();
    getter.body.visit_with(self);
    self.exit_function();
  }

  fn visit_setter_prop(&mut self, setter: &SetterProp) {
    setter.key.visit_with(self);
    self.enter_function();
    let mode = PatternMode::Declare {
      kind: BindingKind::Param,
      destructured: !setter.param.is_ident(),
    };
    self.with_pattern(Some(mode), |this| setter.param.visit_with(this));
    setter.body.visit_with(self);
    self.exit_function();
  }

  fn visit_class_decl(&mut self, decl: &ClassDecl) {
    self.declare(&decl.ident, BindingKind::Class, None);
    decl.class.visit_with(self);
  }

  fn visit_class_expr(&mut self, expr: &ClassExpr) {
    if let Some(ident) = &expr.ident {
      self.declare(ident, BindingKind::Class, None);
    }
    expr.class.visit_with(self);
  }

  fn visit_catch_clause(&mut self, clause: &CatchClause) {
    if let Some(param) = &clause.param {
      let mode = PatternMode::Declare {
        kind: BindingKind::CatchParam,
        destructured: !param.is_ident(),
      };
      self.with_pattern(Some(mode), |this| param.visit_with(this));
    }
    clause.body.visit_with(self);
  }

  fn visit_assign_expr(&mut self, assign: &AssignExpr) {
    assign.right.visit_with(self);
    match &assign.left {
      AssignTarget::Simple(SimpleAssignTarget::Ident(binding)) => {
        if assign.op != AssignOp::Assign {
          self.read(&binding.id);
        }
        self.write(&binding.id);
      }
      AssignTarget::Simple(target) => {
        self.with_pattern(None, |this| target.visit_children_with(this));
      }
      AssignTarget::Pat(pat) => {
        self.with_pattern(Some(PatternMode::Write), |this| pat.visit_children_with(this));
      }
    }
  }

  fn visit_update_expr(&mut self, update: &UpdateExpr) {
    match &*update.arg {
      Expr::Ident(ident) => {
        self.read(ident);
        self.write(ident);
      }
      arg => arg.visit_with(self),
    }
  }

  fn visit_for_in_stmt(&mut self, stmt: &ForInStmt) {
    self.visit_for_head(&stmt.left);
    stmt.right.visit_with(self);
    stmt.body.visit_with(self);
  }

  fn visit_for_of_stmt(&mut self, stmt: &ForOfStmt) {
    self.visit_for_head(&stmt.left);
    stmt.right.visit_with(self);
    stmt.body.visit_with(self);
  }

  fn visit_for_head(&mut self, head: &ForHead) {
    match head {
      ForHead::VarDecl(var) => self.declare_var(var, true),
      ForHead::Pat(pat) => self.with_pattern(Some(PatternMode::Write), |this| pat.visit_with(this)),
      ForHead::UsingDecl(using) => using.visit_children_with(self),
    }
  }

  fn visit_labeled_stmt(&mut self, stmt: &LabeledStmt) {
    stmt.body.visit_with(self);
  }

  fn visit_break_stmt(&mut self, _: &BreakStmt) {}

  fn visit_continue_stmt(&mut self, _: &ContinueStmt) {}

  fn visit_import_specifier(&mut self, specifier: &ImportSpecifier) {
    let local = match specifier {
      ImportSpecifier::Named(named) => &named.local,
      ImportSpecifier::Default(default) => &default.local,
      ImportSpecifier::Namespace(namespace) => &namespace.local,
    };
    self.declare(local, BindingKind::Import, None);
  }

  fn visit_export_decl(&mut self, export: &ExportDecl) {
    self.exporting = true;
    export.decl.visit_with(self);
    self.exporting = false;
  }

  fn visit_export_default_decl(&mut self, export: &ExportDefaultDecl) {
    self.exporting = true;
    export.decl.visit_with(self);
    self.exporting = false;
  }

  fn visit_named_export(&mut self, export: &NamedExport) {
    // Re-exports name bindings of another module
    if export.src.is_some() {
      return;
    }

    for specifier in &export.specifiers {
      if let ExportSpecifier::Named(ExportNamedSpecifier {
        orig: ModuleExportName::Ident(ident),
        ..
      }) = specifier
      {
        self.read(ident);
        self.binding(ident).exported = true;
      }
    }
  }
}

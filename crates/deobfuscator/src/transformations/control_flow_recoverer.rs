use std::collections::{HashMap, HashSet};

use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::config::TransformationKey;
use crate::matchers::{
  capture_id, computed_member, ident, numeric_value, split_call, update, Captures, Matcher,
};
use crate::mutate::references_any;
use crate::transformation::{
  Outcome, TransformContext, TransformError, Transformation, TransformationProperties,
};
use crate::utils::{known_truthiness, StmtItem};

/// Rebuilds statement sequences that were turned into a `switch` inside an endless loop.
///
/// ```js
/// var states = "1|0".split("|"), index = 0;
/// while (true) {
///   switch (states[index++]) {
///     case "0": b(); continue;
///     case "1": a(); continue;
///   }
///   break;
/// }
/// ```
#[derive(Default)]
pub struct ControlFlowRecoverer;

/// `var states = "...".split(sep), counter = 0, ...rest;`
struct Dispatcher {
  states: Vec<String>,
  states_id: Id,
  counter_id: Id,
  rest: Vec<VarDeclarator>,
  kind: VarDeclKind,
}

fn match_dispatcher(stmt: &Stmt) -> Option<Dispatcher> {
  let Stmt::Decl(Decl::Var(var)) = stmt else {
    return None;
  };
  let [states, counter, rest @ ..] = var.decls.as_slice() else {
    return None;
  };

  let states_id = states.name.as_ident()?.id.to_id();
  let states_list = split_call(states.init.as_deref()?)?;
  let counter_id = counter.name.as_ident()?.id.to_id();
  if numeric_value(counter.init.as_deref()?) != Some(0.0) {
    return None;
  }

  Some(Dispatcher {
    states: states_list,
    states_id,
    counter_id,
    rest: rest.to_vec(),
    kind: var.kind,
  })
}

/// Loop tests such as `true` and `!![]`
fn always_true(test: &Expr) -> bool {
  known_truthiness(test) == Some(true)
}

/// The `switch` of `for (;;) { switch (states[counter++]) { ... } break; }`, also written as a
/// `while (true)` loop.
fn match_loop<'a>(stmt: &'a Stmt, dispatcher: &Dispatcher) -> Option<&'a SwitchStmt> {
  let body = match stmt {
    Stmt::For(ForStmt {
      init, test, update: None, body, ..
    }) => {
      let init_matches = match init {
        None => true,
        Some(VarDeclOrExpr::Expr(expr)) => matches!(
          &**expr,
          Expr::Assign(AssignExpr {
            op: AssignOp::Assign,
            left: AssignTarget::Simple(SimpleAssignTarget::Ident(left)),
            right,
            ..
          }) if left.id.to_id() == dispatcher.counter_id && numeric_value(right) == Some(0.0)
        ),
        Some(VarDeclOrExpr::VarDecl(_)) => false,
      };
      if !init_matches || !test.as_deref().map_or(true, always_true) {
        return None;
      }
      body
    }
    Stmt::While(WhileStmt { test, body, .. }) if always_true(test) => body,
    _ => return None,
  };

  let Stmt::Block(block) = &**body else {
    return None;
  };
  let [Stmt::Switch(switch), Stmt::Break(BreakStmt { label: None, .. })] = block.stmts.as_slice()
  else {
    return None;
  };

  let discriminant = computed_member(
    ident(capture_id("states")),
    update(ident(capture_id("counter"))),
  );
  let mut captures = Captures::default();
  captures.bind_id("states", dispatcher.states_id.clone());
  captures.bind_id("counter", dispatcher.counter_id.clone());
  let is_increment = matches!(
    &*switch.discriminant,
    Expr::Member(MemberExpr { prop: MemberProp::Computed(computed), .. })
      if matches!(
        &*computed.expr,
        Expr::Update(UpdateExpr { op: UpdateOp::PlusPlus, prefix: false, .. })
      )
  );
  if !is_increment || !discriminant.matches(&switch.discriminant, &mut captures) {
    return None;
  }

  let all_string_cases = switch
    .cases
    .iter()
    .all(|case| matches!(case.test.as_deref(), Some(Expr::Lit(Lit::Str(_)))));
  all_string_cases.then_some(switch)
}

/// Finds `break` and `continue` that would leave the dispatch loop.
#[derive(Default)]
struct LoopExit {
  switch_depth: usize,
  found: bool,
}

impl Visit for LoopExit {
  fn visit_break_stmt(&mut self, stmt: &BreakStmt) {
    if stmt.label.is_none() && self.switch_depth == 0 {
      self.found = true;
    }
  }

  fn visit_continue_stmt(&mut self, stmt: &ContinueStmt) {
    if stmt.label.is_none() {
      self.found = true;
    }
  }

  fn visit_switch_stmt(&mut self, stmt: &SwitchStmt) {
    self.switch_depth += 1;
    stmt.visit_children_with(self);
    self.switch_depth -= 1;
  }

  fn visit_for_stmt(&mut self, _: &ForStmt) {}
  fn visit_for_in_stmt(&mut self, _: &ForInStmt) {}
  fn visit_for_of_stmt(&mut self, _: &ForOfStmt) {}
  fn visit_while_stmt(&mut self, _: &WhileStmt) {}
  fn visit_do_while_stmt(&mut self, _: &DoWhileStmt) {}
  fn visit_function(&mut self, _: &Function) {}
  fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
  fn visit_class(&mut self, _: &Class) {}
}

fn exits_loop(stmts: &[Stmt]) -> bool {
  stmts.iter().any(|stmt| {
    let mut exit = LoopExit::default();
    stmt.visit_with(&mut exit);
    exit.found
  })
}

/// Concatenate the case bodies in the order the states list visits them.
fn recover(dispatcher: &Dispatcher, switch: &SwitchStmt) -> Result<Vec<Stmt>, Outcome> {
  let mut cases = HashMap::new();
  for (index, case) in switch.cases.iter().enumerate() {
    if let Some(Expr::Lit(Lit::Str(test))) = case.test.as_deref() {
      cases.entry(test.value.to_string()).or_insert(index);
    }
  }
  let dispatch_ids = HashSet::from([dispatcher.states_id.clone(), dispatcher.counter_id.clone()]);

  let mut recovered = vec![];
  for state in &dispatcher.states {
    let Some(&index) = cases.get(state) else {
      return Err(Outcome::Failed(format!("Missing case for state {}", state)));
    };

    let mut body = switch.cases[index].cons.clone();
    let finished = match body.last() {
      Some(Stmt::Continue(ContinueStmt { label: None, .. })) => {
        body.pop();
        false
      }
      Some(Stmt::Break(BreakStmt { label: None, .. })) => {
        body.pop();
        true
      }
      Some(Stmt::Return(_) | Stmt::Throw(_)) => true,
      _ if index + 1 == switch.cases.len() => true,
      _ => return Err(Outcome::Skipped(format!("Case for state {} falls through", state))),
    };

    if exits_loop(&body) {
      return Err(Outcome::Skipped(format!("Case for state {} leaves the loop early", state)));
    }
    if references_any(&body, &dispatch_ids) {
      return Err(Outcome::Skipped(format!("Case for state {} reads the dispatcher", state)));
    }

    recovered.extend(body);
    if finished {
      break;
    }
  }

  Ok(recovered)
}

struct Recoverer {
  outcomes: Vec<Outcome>,
}

impl Recoverer {
  fn recover_in_list<T: StmtItem + VisitMutWith<Self>>(&mut self, items: &mut Vec<T>) {
    for item in items.iter_mut() {
      item.visit_mut_with(self);
    }

    let mut index = 0;
    while index + 1 < items.len() {
      let Some(dispatcher) = items[index].as_stmt().and_then(match_dispatcher) else {
        index += 1;
        continue;
      };
      let Some(switch) = items[index + 1]
        .as_stmt()
        .and_then(|stmt| match_loop(stmt, &dispatcher))
      else {
        index += 1;
        continue;
      };

      match recover(&dispatcher, switch) {
        Ok(recovered) => {
          self.outcomes.push(Outcome::Matched(format!(
            "Recovered {} states of flattened control flow",
            dispatcher.states.len()
          )));

          let mut replacement = vec![];
          if !dispatcher.rest.is_empty() {
            replacement.push(T::from_stmt(Stmt::Decl(Decl::Var(Box::new(VarDecl {
              span: DUMMY_SP,
              ctxt: Default::default(),
              kind: dispatcher.kind,
              declare: false,
              decls: dispatcher.rest,
            })))));
          }
          replacement.extend(recovered.into_iter().map(T::from_stmt));

          let length = replacement.len();
          items.splice(index..index + 2, replacement);
          index += length;
        }
        Err(outcome) => {
          self.outcomes.push(outcome);
          index += 2;
        }
      }
    }
  }
}

impl VisitMut for Recoverer {
  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    self.recover_in_list(stmts);
  }

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    self.recover_in_list(items);
  }
}

impl Transformation for ControlFlowRecoverer {
  fn properties(&self) -> TransformationProperties {
    TransformationProperties {
      key: TransformationKey::ControlFlowRecovery,
      rebuild_scope_tree: true,
    }
  }

  fn execute(
    &mut self,
    module: &mut Module,
    context: &mut TransformContext,
  ) -> Result<bool, TransformError> {
    let mut recoverer = Recoverer { outcomes: vec![] };
    module.visit_mut_with(&mut recoverer);

    let mut changed = false;
    for outcome in recoverer.outcomes {
      changed |= matches!(outcome, Outcome::Matched(_));
      context.report(outcome);
    }
    Ok(changed)
  }
}

use std::cell::RefCell;
use std::rc::Rc;

use sink::host::{HostIo, Wait};
use sink::{RunResult, Script};

/// Records `say`/`warn` output instead of touching a real terminal, so
/// tests can assert on what a script would have printed (spec.md §8's
/// scenarios (a)-(g)).
#[derive(Clone, Default)]
struct RecordingIo {
  said: Rc<RefCell<Vec<String>>>,
  warned: Rc<RefCell<Vec<String>>>,
}

impl HostIo for RecordingIo {
  fn say(&mut self, text: &str) -> Wait<()> {
    self.said.borrow_mut().push(text.to_string());
    Wait::Ready(())
  }

  fn warn(&mut self, text: &str) -> Wait<()> {
    self.warned.borrow_mut().push(text.to_string());
    Wait::Ready(())
  }

  fn ask(&mut self, _prompt: &str) -> Wait<Option<String>> {
    Wait::Ready(None)
  }
}

/// Compiles and fully runs `src`, returning everything it `say`'d.
fn run_say(src: &str) -> Vec<String> {
  let script = Script::compile("test.sink", src).unwrap_or_else(|e| panic!("compile error: {e:?}"));
  let io = RecordingIo::default();
  let mut ctx = script.context().with_io(io.clone()).build();
  let result = ctx.run(1_000_000);
  assert_eq!(result, RunResult::Pass, "script failed: {:?}", ctx.last_error());
  Rc::try_unwrap(io.said).unwrap().into_inner()
}

#[test]
fn scenario_a_say_literal() {
  assert_eq!(run_say("say 'hello'"), vec!["hello"]);
}

#[test]
fn scenario_b_var_arithmetic() {
  assert_eq!(run_say("var a = 1, b = 2\nsay a + b"), vec!["3"]);
}

#[test]
fn scenario_c_user_defined_command() {
  assert_eq!(run_say("def f a, b\n  return a * b\nend\nsay f(3, 4)"), vec!["12"]);
}

#[test]
fn scenario_d_conditional_assign_no_nil() {
  assert_eq!(run_say("var x = {1,2,3}\nx ||= {4,5,6}\nsay x"), vec!["{1, 2, 3}"]);
}

#[test]
fn scenario_e_conditional_assign_per_element() {
  assert_eq!(run_say("var x = {1,nil,3}\nx ||= {4,5,6}\nsay x"), vec!["{1, 5, 3}"]);
}

#[test]
fn scenario_f_self_referential_list_is_circular() {
  assert_eq!(
    run_say("var a = {}\nlist.push a, a\nsay pickle.circular a"),
    vec!["1"]
  );
}

#[test]
fn scenario_g_for_range_loop() {
  assert_eq!(run_say("for var i: range 3\n  say i\nend"), vec!["0", "1", "2"]);
}

#[test]
fn compile_error_reports_file_and_span() {
  let err = Script::compile("broken.sink", "var = \n").unwrap_err();
  assert!(matches!(err, sink::Error::Compile { .. }));
}

#[test]
fn warn_is_recorded_separately_from_say() {
  let script = Script::compile("test.sink", "say 'out'\nwarn 'oops'").unwrap();
  let io = RecordingIo::default();
  let mut ctx = script.context().with_io(io.clone()).build();
  assert_eq!(ctx.run(1_000_000), RunResult::Pass);
  assert_eq!(*io.said.borrow(), vec!["out".to_string()]);
  assert_eq!(*io.warned.borrow(), vec!["oops".to_string()]);
}

//! The core environment: native functions plus a prelude of macros written
//! in Sable itself.

use sable_compiler::Environment;
use sable_foundation::Value;

use crate::vm::natives;

/// Macros evaluated into every [`RunContext`](crate::RunContext) created with
/// [`RunContext::new`](crate::RunContext::new).
pub const PRELUDE: &str = r#"
(def defmacro :macro
  (fn defmacro [name & more]
    (if (string? (get more 0))
      (tuple 'def name :macro (get more 0) (tuple 'fn name ;(slice more 1)))
      (tuple 'def name :macro (tuple 'fn name ;more)))))

(defmacro defn
  "Defines a named function, with an optional doc string."
  [name & more]
  (if (string? (get more 0))
    (tuple 'def name (get more 0) (tuple 'fn name ;(slice more 1)))
    (tuple 'def name (tuple 'fn name ;more))))

(defmacro when
  "Evaluates the body when the condition is truthy."
  [condition & body]
  (tuple 'if condition (tuple 'do ;body)))

(defmacro unless
  "Evaluates the body when the condition is falsy."
  [condition & body]
  (tuple 'if condition nil (tuple 'do ;body)))

(defmacro ++
  "Increments a variable in place."
  [place]
  (tuple 'set place (tuple '+ place 1)))

(defmacro --
  "Decrements a variable in place."
  [place]
  (tuple 'set place (tuple '- place 1)))

(defmacro let
  "Binds names in order, then evaluates the body."
  [bindings & body]
  (def n (length bindings))
  (if (not= 0 (% n 2))
    (error "let expects an even number of binding forms"))
  (def forms @['do])
  (var i 0)
  (while (< i n)
    (array/push forms (tuple 'def (in bindings i) (in bindings (+ i 1))))
    (set i (+ i 2)))
  (tuple ;forms ;body))
"#;

/// Returns an environment holding every native function.
#[must_use]
pub fn core_environment() -> Environment {
    let mut env = Environment::new();
    for native in natives() {
        env.def(native.name, Value::native(native));
    }
    env
}

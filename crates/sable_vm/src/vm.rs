//! Register virtual machine for Sable bytecode.
//!
//! The VM runs verified [`FuncDef`] records. Every call gets a fresh register
//! frame shared through `Rc<RefCell<..>>`, so closures created during the
//! call observe later writes to the registers they captured. Calls run on
//! an explicit activation stack rather than the host stack, and a tail call
//! replaces the running activation instead of pushing a new one.
//!
//! Errors raised while running carry the source position of the failing
//! instruction and one stack frame per function they unwound through.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]

mod native;

use std::cell::RefCell;
use std::rc::Rc;

use sable_compiler::{Evaluator, verify};
use sable_foundation::{
    Capture, Closure, Error, ErrorKind, Frame, FuncDef, FuncFlags, Instr, Intrinsic, Opcode,
    Result, Value, VerifyError,
};

pub(crate) use native::natives;
use native::{
    add_values, compare_values, concat_text, div_values, get_value, in_value, length_of,
    mod_values, mul_values, pairs, put_value, raise, sub_values,
};

use crate::context::RunContext;

/// Default limit on nested (non-tail) calls.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// What the instruction loop does after one instruction.
enum Flow {
    Next,
    Jump(i32),
    Return(Value),
    Call { callee: Value, args: Vec<Value>, dest: u32 },
    Tailcall(Value, Vec<Value>),
}

/// A callee after `apply` and natives have been resolved.
enum Target {
    Enter(Rc<Closure>, Vec<Value>),
    Done(Value),
}

/// One running call: its closure, register frame, program counter, and the
/// arguments pushed for the next call it makes.
struct Activation {
    closure: Rc<Closure>,
    frame: Frame,
    pc: usize,
    args: Vec<Value>,
    /// Register awaiting the result of the call in progress.
    dest: Option<u32>,
}

/// Register virtual machine.
pub struct Vm {
    /// Calls currently running.
    depth: usize,
    /// Deepest nesting allowed before "stack overflow".
    max_depth: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates a new VM.
    #[must_use]
    pub fn new() -> Self {
        Self {
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Builder method to set the call depth limit.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Returns the number of calls currently running.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Verifies `def` and its nested records and wraps it in a closure.
    ///
    /// # Errors
    ///
    /// Returns a structural error if any record fails verification or if
    /// `def` expects captured environments.
    pub fn load(&self, def: Rc<FuncDef>) -> Result<Value> {
        verify_tree(&def)?;
        if !def.environments.is_empty() {
            return Err(Error::structural(VerifyError::EnvOutOfRange { pc: None }));
        }
        Ok(Value::Function(Rc::new(Closure {
            def,
            envs: Vec::new(),
        })))
    }

    /// Loads `def` and calls it with no arguments.
    ///
    /// # Errors
    ///
    /// Returns a structural error for invalid bytecode, or the runtime error
    /// the code raised.
    pub fn run(&mut self, def: Rc<FuncDef>) -> Result<Value> {
        let thunk = self.load(def)?;
        self.invoke(&thunk, Vec::new())
    }

    /// Calls `callee` with `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if `callee` is not callable, rejects the argument
    /// count, or raises while running.
    pub fn invoke(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        match prepare(callee.clone(), args)? {
            Target::Done(value) => Ok(value),
            Target::Enter(closure, args) => {
                let base = self.depth;
                let mut stack = Vec::new();
                let result = self
                    .enter(&mut stack, closure, args)
                    .and_then(|()| self.execute(&mut stack));
                self.depth = base;
                result
            }
        }
    }

    /// Pushes a call of `closure` onto `stack`.
    fn enter(
        &mut self,
        stack: &mut Vec<Activation>,
        closure: Rc<Closure>,
        args: Vec<Value>,
    ) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::new(ErrorKind::RecursionLimit("stack overflow".into())));
        }
        log::trace!(
            "calling {} with {} arguments",
            closure.def.display_name(),
            args.len()
        );
        let frame = bind_arguments(&closure.def, args)?;
        stack.push(Activation {
            closure,
            frame,
            pc: 0,
            args: Vec::new(),
            dest: None,
        });
        self.depth += 1;
        Ok(())
    }

    /// Pops the running call.
    fn leave(&mut self, stack: &mut Vec<Activation>) {
        if stack.pop().is_some() {
            self.depth -= 1;
        }
    }

    /// Runs calls until the bottom of `stack` returns. An error records one
    /// frame per call it unwinds through.
    fn execute(&mut self, stack: &mut Vec<Activation>) -> Result<Value> {
        self.run_activations(stack).map_err(|error| {
            stack.iter().rev().fold(error, |error, activation| {
                annotate(error, &activation.closure.def, activation.pc)
            })
        })
    }

    fn run_activations(&mut self, stack: &mut Vec<Activation>) -> Result<Value> {
        loop {
            let top = current(stack)?;
            let instr = top.fetch()?;
            match top.step(instr)? {
                Flow::Next => top.pc += 1,
                Flow::Jump(displacement) => top.jump(displacement)?,
                Flow::Return(value) => {
                    self.leave(stack);
                    match stack.last_mut() {
                        Some(caller) => caller.resume(value)?,
                        None => return Ok(value),
                    }
                }
                Flow::Call { callee, args, dest } => {
                    top.dest = Some(dest);
                    match prepare(callee, args)? {
                        Target::Enter(closure, args) => self.enter(stack, closure, args)?,
                        Target::Done(value) => top.resume(value)?,
                    }
                }
                Flow::Tailcall(callee, args) => {
                    let target = prepare(callee, args)?;
                    self.leave(stack);
                    match target {
                        Target::Enter(closure, args) => self.enter(stack, closure, args)?,
                        Target::Done(value) => match stack.last_mut() {
                            Some(caller) => caller.resume(value)?,
                            None => return Ok(value),
                        },
                    }
                }
            }
        }
    }
}

fn current(stack: &mut [Activation]) -> Result<&mut Activation> {
    stack
        .last_mut()
        .ok_or_else(|| Error::new(ErrorKind::Internal("no call is running".into())))
}

/// Resolves `apply` chains and runs natives, leaving closures to be entered.
fn prepare(mut callee: Value, mut args: Vec<Value>) -> Result<Target> {
    loop {
        let next = match &callee {
            Value::Function(closure) => return Ok(Target::Enter(Rc::clone(closure), args)),
            Value::Native(native) if native.intrinsic == Some(Intrinsic::Apply) => spread_apply(args)?,
            Value::Native(native) => {
                log::trace!("calling native {} with {} arguments", native.name, args.len());
                return (native.func)(&args).map(Target::Done);
            }
            other => return Err(Error::type_mismatch("function", other.type_name())),
        };
        (callee, args) = next;
    }
}

impl Activation {
    fn fetch(&self) -> Result<Instr> {
        let word = self
            .closure
            .def
            .bytecode
            .get(self.pc)
            .copied()
            .ok_or_else(|| Error::structural(VerifyError::MissingTerminator))?;
        Instr::decode(word).map_err(|_| Error::structural(VerifyError::BadInstruction { pc: self.pc }))
    }

    fn jump(&mut self, displacement: i32) -> Result<()> {
        let pc = self.pc;
        let target = pc as i64 + i64::from(displacement);
        self.pc = usize::try_from(target)
            .map_err(|_| Error::structural(VerifyError::JumpOutOfRange { pc, target }))?;
        Ok(())
    }

    /// Stores the result of the finished call and moves past it.
    fn resume(&mut self, value: Value) -> Result<()> {
        if let Some(dest) = self.dest.take() {
            Registers(&self.frame).set(dest, value)?;
        }
        self.pc += 1;
        Ok(())
    }

    fn step(&mut self, instr: Instr) -> Result<Flow> {
        use Opcode as Op;
        let pc = self.pc;
        let closure = &self.closure;
        let def = &closure.def;
        let frame = &self.frame;
        let args = &mut self.args;
        let regs = Registers(frame);
        match instr {
            Instr::None(Op::Noop) => {}
            Instr::None(Op::ReturnNil) => return Ok(Flow::Return(Value::Nil)),
            Instr::S(Op::Return, a) => return Ok(Flow::Return(regs.get(a)?)),
            Instr::S(Op::Error, a) => return Err(raise(&regs.get(a)?)),
            Instr::L(Op::Jump, displacement) => return Ok(Flow::Jump(displacement)),
            Instr::SL(op, a, displacement) => {
                let value = regs.get(a.into())?;
                let taken = match op {
                    Op::JumpIf => value.is_truthy(),
                    Op::JumpIfNot => !value.is_truthy(),
                    Op::JumpIfNil => value.is_nil(),
                    Op::JumpIfNotNil => !value.is_nil(),
                    _ => return Err(malformed(instr)),
                };
                if taken {
                    return Ok(Flow::Jump(displacement.into()));
                }
            }

            // Loads and moves
            Instr::S(Op::LoadNil, a) => regs.set(a, Value::Nil)?,
            Instr::S(Op::LoadTrue, a) => regs.set(a, Value::Bool(true))?,
            Instr::S(Op::LoadFalse, a) => regs.set(a, Value::Bool(false))?,
            Instr::S(Op::LoadSelf, a) => regs.set(a, Value::Function(Rc::clone(closure)))?,
            Instr::SI(Op::LoadInteger, a, n) => regs.set(a.into(), Value::Int(n.into()))?,
            Instr::SC(Op::LoadConstant, a, index) => {
                let value = def
                    .constants
                    .get(usize::from(index))
                    .cloned()
                    .ok_or_else(|| Error::structural(VerifyError::ConstantOutOfRange { pc }))?;
                regs.set(a.into(), value)?;
            }
            Instr::SS(Op::MoveNear, a, b) => regs.set(a.into(), regs.get(b.into())?)?,
            Instr::SS(Op::MoveFar, a, b) => regs.set(b.into(), regs.get(a.into())?)?,

            // Upvalues and closures
            Instr::SES(Op::LoadUpvalue, a, env, index) => {
                let env = upvalue_frame(closure, usize::from(env), pc)?;
                let value = env
                    .borrow()
                    .get(usize::from(index))
                    .cloned()
                    .ok_or_else(|| upvalue_error(index))?;
                regs.set(a.into(), value)?;
            }
            Instr::SES(Op::SetUpvalue, a, env, index) => {
                let value = regs.get(a.into())?;
                let env = upvalue_frame(closure, usize::from(env), pc)?;
                let mut env = env.borrow_mut();
                let slot = env
                    .get_mut(usize::from(index))
                    .ok_or_else(|| upvalue_error(index))?;
                *slot = value;
            }
            Instr::SD(Op::Closure, a, index) => {
                let child = def
                    .defs
                    .get(usize::from(index))
                    .cloned()
                    .ok_or_else(|| Error::structural(VerifyError::DefOutOfRange { pc }))?;
                let envs = child
                    .environments
                    .iter()
                    .map(|capture| match capture {
                        Capture::Frame => Ok(Rc::clone(frame)),
                        Capture::Upvalue(j) => upvalue_frame(closure, usize::from(*j), pc),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let made = Closure { def: child, envs };
                regs.set(a.into(), Value::Function(Rc::new(made)))?;
            }

            // Calls
            Instr::S(Op::Push, a) => args.push(regs.get(a)?),
            Instr::SS(Op::Push2, a, b) => {
                args.push(regs.get(a.into())?);
                args.push(regs.get(b.into())?);
            }
            Instr::SSS(Op::Push3, a, b, c) => {
                args.push(regs.get(a.into())?);
                args.push(regs.get(b.into())?);
                args.push(regs.get(c.into())?);
            }
            Instr::S(Op::PushArray, a) => {
                let value = regs.get(a)?;
                let items = value
                    .indexed_items()
                    .ok_or_else(|| Error::type_mismatch("array or tuple", value.type_name()))?;
                args.extend(items);
            }
            Instr::SS(Op::Call, a, b) => {
                return Ok(Flow::Call {
                    callee: regs.get(b.into())?,
                    args: std::mem::take(args),
                    dest: a.into(),
                });
            }
            Instr::S(Op::Tailcall, a) => {
                return Ok(Flow::Tailcall(regs.get(a)?, std::mem::take(args)));
            }

            // Data structures
            Instr::SSS(Op::Put, a, b, c) => {
                put_value(&regs.get(a.into())?, &regs.get(b.into())?, regs.get(c.into())?)?;
            }
            Instr::SSU(Op::GetIndex, a, b, index) => {
                let value = get_value(&regs.get(b.into())?, &Value::Int(index.into()))?;
                regs.set(a.into(), value)?;
            }
            Instr::SSU(Op::PutIndex, a, b, index) => {
                put_value(&regs.get(a.into())?, &Value::Int(index.into()), regs.get(b.into())?)?;
            }
            Instr::SS(Op::Length, a, b) => {
                let length = length_of(&regs.get(b.into())?)?;
                let length = i64::try_from(length)
                    .map_err(|_| Error::runtime("length does not fit in an integer"))?;
                regs.set(a.into(), Value::Int(length))?;
            }
            Instr::S(
                op @ (Op::MakeArray
                | Op::MakeTuple
                | Op::MakeBracketTuple
                | Op::MakeStruct
                | Op::MakeTable
                | Op::MakeBuffer),
                a,
            ) => regs.set(a, make(op, std::mem::take(args))?)?,

            // Arithmetic, comparison, lookup
            Instr::SSS(op, a, b, c) => {
                let value = binary(op, &regs.get(b.into())?, &regs.get(c.into())?)?;
                regs.set(a.into(), value)?;
            }
            Instr::SSI(op, a, b, immediate) => {
                let value = binary(op, &regs.get(b.into())?, &Value::Int(immediate.into()))?;
                regs.set(a.into(), value)?;
            }
            _ => return Err(malformed(instr)),
        }
        Ok(Flow::Next)
    }
}

impl Evaluator for Vm {
    fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value> {
        self.invoke(callee, args.to_vec())
    }
}

/// Short-lived access to a frame's registers. Borrows never outlive one
/// read or write, so calls made between them may share the frame.
struct Registers<'f>(&'f Frame);

impl Registers<'_> {
    fn get(&self, register: u32) -> Result<Value> {
        self.0
            .borrow()
            .get(register as usize)
            .cloned()
            .ok_or_else(|| register_error(register))
    }

    fn set(&self, register: u32, value: Value) -> Result<()> {
        let mut registers = self.0.borrow_mut();
        let slot = registers
            .get_mut(register as usize)
            .ok_or_else(|| register_error(register))?;
        *slot = value;
        Ok(())
    }
}

fn register_error(register: u32) -> Error {
    Error::new(ErrorKind::Internal(format!(
        "register {register} is outside the frame"
    )))
}

fn upvalue_error(index: u8) -> Error {
    Error::new(ErrorKind::Internal(format!(
        "upvalue {index} is outside its environment"
    )))
}

fn malformed(instr: Instr) -> Error {
    Error::new(ErrorKind::Internal(format!("malformed instruction {instr}")))
}

fn upvalue_frame(closure: &Closure, env: usize, pc: usize) -> Result<Frame> {
    closure
        .envs
        .get(env)
        .cloned()
        .ok_or_else(|| Error::structural(VerifyError::EnvOutOfRange { pc: Some(pc) }))
}

fn binary(op: Opcode, left: &Value, right: &Value) -> Result<Value> {
    use Opcode as Op;
    Ok(match op {
        Op::Add | Op::AddImmediate => add_values(left, right)?,
        Op::Subtract | Op::SubtractImmediate => sub_values(left, right)?,
        Op::Multiply | Op::MultiplyImmediate => mul_values(left, right)?,
        Op::Divide | Op::DivideImmediate => div_values(left, right)?,
        Op::Modulo => mod_values(left, right)?,
        Op::Equals => Value::Bool(left == right),
        Op::NotEquals => Value::Bool(left != right),
        Op::LessThan => Value::Bool(compare_values(left, right).is_lt()),
        Op::LessThanEqual => Value::Bool(compare_values(left, right).is_le()),
        Op::GreaterThan => Value::Bool(compare_values(left, right).is_gt()),
        Op::GreaterThanEqual => Value::Bool(compare_values(left, right).is_ge()),
        Op::Get => get_value(left, right)?,
        Op::In => in_value(left, right)?,
        other => {
            return Err(Error::new(ErrorKind::Internal(format!(
                "{} is not a binary operation",
                other.mnemonic()
            ))));
        }
    })
}

fn make(op: Opcode, items: Vec<Value>) -> Result<Value> {
    Ok(match op {
        Opcode::MakeArray => Value::array(items),
        Opcode::MakeTuple => Value::tuple(items),
        Opcode::MakeBracketTuple => Value::bracket_tuple(items),
        Opcode::MakeStruct => Value::struct_from(pairs(&items)?),
        Opcode::MakeTable => Value::table_from(pairs(&items)?),
        _ => Value::buffer(concat_text(&items)),
    })
}

/// Splits `(apply f a b [c d])` into `f` and `(a b c d)`.
fn spread_apply(mut args: Vec<Value>) -> Result<(Value, Vec<Value>)> {
    if args.len() < 2 {
        return Err(Error::arity_mismatch("at least 2", args.len()));
    }
    let Some(last) = args.pop() else {
        return Err(Error::arity_mismatch("at least 2", 0));
    };
    let items = last
        .indexed_items()
        .ok_or_else(|| Error::type_mismatch("array or tuple", last.type_name()))?;
    let callee = args.remove(0);
    args.extend(items);
    Ok((callee, args))
}

fn expected_arity(def: &FuncDef) -> String {
    match (def.min_arity, def.max_arity) {
        (min, max) if min == max => min.to_string(),
        (min, u32::MAX) => format!("at least {min}"),
        (min, max) => format!("{min} to {max}"),
    }
}

/// Builds the frame for a call: fixed parameters in the first registers,
/// missing optional ones nil, and extra arguments packed after them.
fn bind_arguments(def: &FuncDef, mut args: Vec<Value>) -> Result<Frame> {
    if !def.accepts(args.len()) {
        let error = Error::arity_mismatch(expected_arity(def), args.len());
        return Err(with_frame(error, def.display_name()));
    }
    let arity = def.arity as usize;
    let extra = if args.len() > arity {
        args.split_off(arity)
    } else {
        Vec::new()
    };
    let mut registers = args;
    registers.resize(def.slot_count as usize, Value::Nil);
    if def.is_variadic() {
        let rest = if def.flags.contains(FuncFlags::STRUCTARG) {
            Value::struct_from(pairs(&extra).map_err(|e| with_frame(e, def.display_name()))?)
        } else {
            Value::tuple(extra)
        };
        if let Some(slot) = registers.get_mut(arity) {
            *slot = rest;
        }
    }
    Ok(Rc::new(RefCell::new(registers)))
}

fn verify_tree(def: &FuncDef) -> Result<()> {
    verify(def).map_err(Error::structural)?;
    def.defs.iter().try_for_each(|child| verify_tree(child))
}

fn with_frame(mut error: Error, name: &str) -> Error {
    let context = error.context.take().unwrap_or_default().with_frame(name);
    error.context = Some(context);
    error
}

/// Pins `error` to the instruction at `pc` unless it already has a
/// position, and records the function on its stack.
fn annotate(error: Error, def: &FuncDef, pc: usize) -> Error {
    let error = match def.source_map.get(pc) {
        Some(span) if error.position().is_none() => error.at(*span),
        _ => error,
    };
    let mut error = with_frame(error, def.display_name());
    if let (Some(context), Some(source)) = (error.context.as_mut(), &def.source) {
        if context.source.is_none() {
            context.source = Some(source.clone());
        }
    }
    error
}

/// Evaluates source text in a fresh context with the prelude loaded and
/// returns the value of the last form.
///
/// # Errors
///
/// Returns the first parse, compile or runtime error.
pub fn eval(source: &str) -> Result<Value> {
    RunContext::new()?.eval_str(source)
}

//! Bytecode executor.
//!
//! Runs a compiled module's entry function under hard ceilings: an
//! instruction fuel budget, a wall-clock deadline, a call-depth cap, and the
//! value-size budget. Exhausting any of them traps the script the same way a
//! script-thrown exception does; the engine reports both as runtime errors.
//! The capability handle is borrowed for the duration of the call and is the
//! only way a script touches the outside world.

use std::time::{Duration, Instant};

use crate::builtins;
use crate::capability::CapabilityHandle;
use crate::compile::{CompiledModule, Const, Function, Op};
use crate::generate::{ENTRY_ARITY, ENTRY_SYMBOL};
use crate::value::{ScriptValue, ValueBudget};

/// Ops between wall-clock checks. Instant reads are cheap but not free.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmBudget {
    pub fuel: u64,
    pub deadline: Duration,
    pub max_call_depth: usize,
    pub values: ValueBudget,
}

impl Default for VmBudget {
    fn default() -> Self {
        Self {
            fuel: 5_000_000,
            deadline: Duration::from_secs(5),
            max_call_depth: 64,
            values: ValueBudget::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub fuel_used: u64,
}

/// Execution failure, split by whose fault it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The script misbehaved: trap, thrown value, failed capability
    /// operation, or an exhausted budget. `detail` carries the script
    /// backtrace.
    Runtime {
        message: String,
        detail: Option<String>,
    },
    /// The engine itself is broken (malformed module, impossible state).
    Internal(String),
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Runtime { message, .. } => write!(f, "runtime error: {message}"),
            ExecError::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for ExecError {}

/// Looks up and runs the entry function with the capability handle bound to
/// its single parameter.
pub fn execute_entry(
    module: &CompiledModule,
    service: &dyn CapabilityHandle,
    budget: &VmBudget,
) -> Result<(ScriptValue, ExecStats), ExecError> {
    let Some(entry) = module.functions.get(ENTRY_SYMBOL) else {
        return Err(ExecError::Internal(format!(
            "compiled module has no entry function '{ENTRY_SYMBOL}'"
        )));
    };
    if entry.arity != ENTRY_ARITY {
        return Err(ExecError::Internal(format!(
            "entry function '{ENTRY_SYMBOL}' has arity {}, expected {ENTRY_ARITY}",
            entry.arity
        )));
    }
    let mut vm = Vm {
        module,
        service,
        budget,
        stack: vec![ScriptValue::Capability],
        frames: vec![Frame {
            function: entry,
            ip: 0,
            base: 0,
        }],
        fuel_used: 0,
        started: Instant::now(),
    };
    let value = vm.run()?;
    Ok((
        value,
        ExecStats {
            fuel_used: vm.fuel_used,
        },
    ))
}

struct Frame<'m> {
    function: &'m Function,
    ip: usize,
    base: usize,
}

struct Vm<'m> {
    module: &'m CompiledModule,
    service: &'m dyn CapabilityHandle,
    budget: &'m VmBudget,
    stack: Vec<ScriptValue>,
    frames: Vec<Frame<'m>>,
    fuel_used: u64,
    started: Instant,
}

impl<'m> Vm<'m> {
    fn run(&mut self) -> Result<ScriptValue, ExecError> {
        loop {
            self.fuel_used += 1;
            if self.fuel_used > self.budget.fuel {
                return Err(self.trap(format!(
                    "fuel budget exhausted: max_fuel={}",
                    self.budget.fuel
                )));
            }
            if self.fuel_used % DEADLINE_CHECK_INTERVAL == 0
                && self.started.elapsed() > self.budget.deadline
            {
                return Err(self.trap(format!(
                    "execution deadline exceeded: deadline_ms={}",
                    self.budget.deadline.as_millis()
                )));
            }

            let frame = self
                .frames
                .last_mut()
                .ok_or_else(|| ExecError::Internal("no active frame".to_string()))?;
            let Some(&op) = frame.function.chunk.ops.get(frame.ip) else {
                return Err(ExecError::Internal(format!(
                    "instruction pointer out of range in '{}'",
                    frame.function.name
                )));
            };
            frame.ip += 1;

            match op {
                Op::Const(i) => {
                    let c = self.constant(i)?;
                    self.stack.push(c);
                }
                Op::Null => self.stack.push(ScriptValue::Null),
                Op::True => self.stack.push(ScriptValue::Bool(true)),
                Op::False => self.stack.push(ScriptValue::Bool(false)),
                Op::LoadLocal(i) => {
                    let slot = self.frame_base() + i as usize;
                    let value = self
                        .stack
                        .get(slot)
                        .cloned()
                        .ok_or_else(|| ExecError::Internal("local slot out of range".into()))?;
                    self.stack.push(value);
                }
                Op::StoreLocal(i) => {
                    let value = self.pop()?;
                    let slot = self.frame_base() + i as usize;
                    let cell = self
                        .stack
                        .get_mut(slot)
                        .ok_or_else(|| ExecError::Internal("local slot out of range".into()))?;
                    *cell = value;
                }
                Op::Pop => {
                    self.pop()?;
                }
                Op::MakeList(n) => {
                    let n = n as usize;
                    self.budget
                        .values
                        .check_list(n)
                        .map_err(|m| self.trap(m))?;
                    let at = self.stack.len().checked_sub(n).ok_or_else(|| {
                        ExecError::Internal("stack underflow in list build".into())
                    })?;
                    let items = self.stack.split_off(at);
                    self.stack.push(ScriptValue::List(items));
                }
                Op::MakeMap => self.stack.push(ScriptValue::Map(Default::default())),
                Op::Index => {
                    let index = self.pop()?;
                    let base = self.pop()?;
                    let value = self.index_value(&base, &index)?;
                    self.stack.push(value);
                }
                Op::StoreIndex => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let container = self.pop()?;
                    let updated = self.store_index(container, index, value)?;
                    self.stack.push(updated);
                }
                Op::GetMember(i) => {
                    let name = self.constant_str(i)?;
                    let base = self.pop()?;
                    let value = match base {
                        ScriptValue::Map(map) => {
                            map.get(&name).cloned().unwrap_or(ScriptValue::Null)
                        }
                        ScriptValue::Capability => {
                            return Err(self.trap(format!(
                                "capability operation '{name}' must be called, not read"
                            )));
                        }
                        other => {
                            return Err(self.trap(format!(
                                "cannot read member '{name}' of {}",
                                other.type_name()
                            )));
                        }
                    };
                    self.stack.push(value);
                }
                Op::CallBuiltin { id, argc } => {
                    let args = self.pop_args(argc as usize)?;
                    let value = builtins::invoke(id, &args, &self.budget.values)
                        .map_err(|m| self.trap(m))?;
                    self.stack.push(value);
                }
                Op::CallFunction { name, argc } => {
                    if self.frames.len() >= self.budget.max_call_depth {
                        return Err(self.trap(format!(
                            "call depth budget exhausted: max_call_depth={}",
                            self.budget.max_call_depth
                        )));
                    }
                    let name = self.constant_str(name)?;
                    let function = self.module.functions.get(&name).ok_or_else(|| {
                        ExecError::Internal(format!("call to unlinked function '{name}'"))
                    })?;
                    let base = self
                        .stack
                        .len()
                        .checked_sub(argc as usize)
                        .ok_or_else(|| ExecError::Internal("stack underflow in call".into()))?;
                    self.frames.push(Frame {
                        function,
                        ip: 0,
                        base,
                    });
                }
                Op::CallMethod { name, argc } => {
                    let name = self.constant_str(name)?;
                    let args = self.pop_args(argc as usize)?;
                    let receiver = self.pop()?;
                    match receiver {
                        ScriptValue::Capability => {
                            let value = self
                                .service
                                .invoke(&name, &args)
                                .map_err(|e| self.trap(e.message))?;
                            self.stack.push(value);
                        }
                        other => {
                            return Err(self.trap(format!(
                                "method call '{name}' on {}; only the capability parameter \
                                 supports method calls",
                                other.type_name()
                            )));
                        }
                    }
                }
                Op::Jump(target) => self.jump(target)?,
                Op::JumpIfFalse(target) => {
                    let cond = self.pop_bool()?;
                    if !cond {
                        self.jump(target)?;
                    }
                }
                Op::JumpIfFalseKeep(target) => {
                    if !self.peek_bool()? {
                        self.jump(target)?;
                    }
                }
                Op::JumpIfTrueKeep(target) => {
                    if self.peek_bool()? {
                        self.jump(target)?;
                    }
                }
                Op::Add => self.binary_add()?,
                Op::Sub | Op::Mul | Op::Div | Op::Rem => self.binary_arith(op)?,
                Op::Eq | Op::Ne => {
                    let rhs = self.pop()?;
                    let lhs = self.pop()?;
                    let eq = values_equal(&lhs, &rhs);
                    self.stack
                        .push(ScriptValue::Bool(if op == Op::Eq { eq } else { !eq }));
                }
                Op::Lt | Op::Le | Op::Gt | Op::Ge => self.binary_compare(op)?,
                Op::Neg => {
                    let v = self.pop()?;
                    let out = match v {
                        ScriptValue::Int(i) => ScriptValue::Int(
                            i.checked_neg()
                                .ok_or_else(|| self.trap("integer overflow".to_string()))?,
                        ),
                        ScriptValue::Float(f) => ScriptValue::Float(-f),
                        other => {
                            return Err(
                                self.trap(format!("cannot negate {}", other.type_name()))
                            );
                        }
                    };
                    self.stack.push(out);
                }
                Op::Not => {
                    let v = self.pop()?;
                    match v {
                        ScriptValue::Bool(b) => self.stack.push(ScriptValue::Bool(!b)),
                        other => {
                            return Err(self.trap(format!(
                                "'!' expects a bool, got {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                Op::Throw => {
                    let v = self.pop()?;
                    return Err(self.trap(format!("script exception: {}", v.render())));
                }
                Op::Return => {
                    let value = self.pop()?;
                    let frame = self
                        .frames
                        .pop()
                        .ok_or_else(|| ExecError::Internal("return with no frame".into()))?;
                    self.stack.truncate(frame.base);
                    if self.frames.is_empty() {
                        return Ok(value);
                    }
                    self.stack.push(value);
                }
            }
        }
    }

    fn frame_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.base)
    }

    fn jump(&mut self, target: u32) -> Result<(), ExecError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| ExecError::Internal("jump with no frame".into()))?;
        if target as usize > frame.function.chunk.ops.len() {
            return Err(ExecError::Internal("jump target out of range".into()));
        }
        frame.ip = target as usize;
        Ok(())
    }

    fn constant(&self, index: u16) -> Result<ScriptValue, ExecError> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| ExecError::Internal("constant read with no frame".into()))?;
        match frame.function.chunk.consts.get(index as usize) {
            Some(Const::Int(i)) => Ok(ScriptValue::Int(*i)),
            Some(Const::Float(f)) => Ok(ScriptValue::Float(*f)),
            Some(Const::Str(s)) => Ok(ScriptValue::Str(s.clone())),
            None => Err(ExecError::Internal("constant index out of range".into())),
        }
    }

    fn constant_str(&self, index: u16) -> Result<String, ExecError> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| ExecError::Internal("constant read with no frame".into()))?;
        match frame.function.chunk.consts.get(index as usize) {
            Some(Const::Str(s)) => Ok(s.clone()),
            _ => Err(ExecError::Internal("name constant is not a string".into())),
        }
    }

    fn pop(&mut self) -> Result<ScriptValue, ExecError> {
        self.stack
            .pop()
            .ok_or_else(|| ExecError::Internal("stack underflow".into()))
    }

    fn pop_args(&mut self, argc: usize) -> Result<Vec<ScriptValue>, ExecError> {
        let at = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or_else(|| ExecError::Internal("stack underflow in call".into()))?;
        Ok(self.stack.split_off(at))
    }

    fn pop_bool(&mut self) -> Result<bool, ExecError> {
        match self.pop()? {
            ScriptValue::Bool(b) => Ok(b),
            other => Err(self.trap(format!(
                "condition must be a bool, got {}",
                other.type_name()
            ))),
        }
    }

    fn peek_bool(&mut self) -> Result<bool, ExecError> {
        match self.stack.last() {
            Some(ScriptValue::Bool(b)) => Ok(*b),
            Some(other) => {
                let t = other.type_name();
                Err(self.trap(format!("condition must be a bool, got {t}")))
            }
            None => Err(ExecError::Internal("stack underflow".into())),
        }
    }

    fn index_value(
        &self,
        base: &ScriptValue,
        index: &ScriptValue,
    ) -> Result<ScriptValue, ExecError> {
        match (base, index) {
            (ScriptValue::List(items), ScriptValue::Int(i)) => {
                let i = usize::try_from(*i)
                    .ok()
                    .filter(|i| *i < items.len())
                    .ok_or_else(|| {
                        self.trap(format!(
                            "list index {i} out of range (len {})",
                            items.len()
                        ))
                    })?;
                Ok(items[i].clone())
            }
            // Missing map keys read as null, matching member access.
            (ScriptValue::Map(map), ScriptValue::Str(key)) => {
                Ok(map.get(key).cloned().unwrap_or(ScriptValue::Null))
            }
            (base, index) => Err(self.trap(format!(
                "cannot index {} with {}",
                base.type_name(),
                index.type_name()
            ))),
        }
    }

    fn store_index(
        &self,
        container: ScriptValue,
        index: ScriptValue,
        value: ScriptValue,
    ) -> Result<ScriptValue, ExecError> {
        match (container, index) {
            (ScriptValue::List(mut items), ScriptValue::Int(i)) => {
                let len = items.len();
                let i = usize::try_from(i)
                    .ok()
                    .filter(|i| *i < len)
                    .ok_or_else(|| {
                        self.trap(format!("list index {i} out of range (len {len})"))
                    })?;
                items[i] = value;
                Ok(ScriptValue::List(items))
            }
            (ScriptValue::Map(mut map), ScriptValue::Str(key)) => {
                if !map.contains_key(&key) {
                    self.budget
                        .values
                        .check_list(map.len() + 1)
                        .map_err(|m| self.trap(m))?;
                }
                map.insert(key, value);
                Ok(ScriptValue::Map(map))
            }
            (container, index) => Err(self.trap(format!(
                "cannot index {} with {}",
                container.type_name(),
                index.type_name()
            ))),
        }
    }

    fn binary_add(&mut self) -> Result<(), ExecError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let out = match (&lhs, &rhs) {
            (ScriptValue::Int(a), ScriptValue::Int(b)) => ScriptValue::Int(
                a.checked_add(*b)
                    .ok_or_else(|| self.trap("integer overflow".to_string()))?,
            ),
            (ScriptValue::Float(a), ScriptValue::Float(b)) => ScriptValue::Float(a + b),
            (ScriptValue::Int(a), ScriptValue::Float(b)) => ScriptValue::Float(*a as f64 + b),
            (ScriptValue::Float(a), ScriptValue::Int(b)) => ScriptValue::Float(a + *b as f64),
            (ScriptValue::Str(_), _) | (_, ScriptValue::Str(_)) => {
                let s = format!("{}{}", lhs.render(), rhs.render());
                self.budget
                    .values
                    .check_str(s.len())
                    .map_err(|m| self.trap(m))?;
                ScriptValue::Str(s)
            }
            _ => {
                return Err(self.trap(format!(
                    "cannot add {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            }
        };
        self.stack.push(out);
        Ok(())
    }

    fn binary_arith(&mut self, op: Op) -> Result<(), ExecError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let out = match (&lhs, &rhs) {
            (ScriptValue::Int(a), ScriptValue::Int(b)) => {
                let (a, b) = (*a, *b);
                let r = match op {
                    Op::Sub => a.checked_sub(b),
                    Op::Mul => a.checked_mul(b),
                    Op::Div => {
                        if b == 0 {
                            return Err(self.trap("division by zero".to_string()));
                        }
                        a.checked_div(b)
                    }
                    Op::Rem => {
                        if b == 0 {
                            return Err(self.trap("division by zero".to_string()));
                        }
                        a.checked_rem(b)
                    }
                    _ => unreachable!(),
                };
                ScriptValue::Int(
                    r.ok_or_else(|| self.trap("integer overflow".to_string()))?,
                )
            }
            (ScriptValue::Int(_) | ScriptValue::Float(_), ScriptValue::Int(_) | ScriptValue::Float(_)) => {
                let a = as_f64(&lhs);
                let b = as_f64(&rhs);
                ScriptValue::Float(match op {
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                    Op::Div => a / b,
                    Op::Rem => a % b,
                    _ => unreachable!(),
                })
            }
            _ => {
                return Err(self.trap(format!(
                    "arithmetic on {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            }
        };
        self.stack.push(out);
        Ok(())
    }

    fn binary_compare(&mut self, op: Op) -> Result<(), ExecError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let ord = match (&lhs, &rhs) {
            (ScriptValue::Int(a), ScriptValue::Int(b)) => a.partial_cmp(b),
            (ScriptValue::Str(a), ScriptValue::Str(b)) => a.partial_cmp(b),
            (ScriptValue::Int(_) | ScriptValue::Float(_), ScriptValue::Int(_) | ScriptValue::Float(_)) => {
                as_f64(&lhs).partial_cmp(&as_f64(&rhs))
            }
            _ => None,
        };
        let Some(ord) = ord else {
            return Err(self.trap(format!(
                "cannot compare {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        };
        let result = match op {
            Op::Lt => ord.is_lt(),
            Op::Le => ord.is_le(),
            Op::Gt => ord.is_gt(),
            Op::Ge => ord.is_ge(),
            _ => unreachable!(),
        };
        self.stack.push(ScriptValue::Bool(result));
        Ok(())
    }

    /// Builds a runtime-error trap carrying the script backtrace.
    fn trap(&self, message: String) -> ExecError {
        let mut lines = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let at = frame.ip.saturating_sub(1);
            let line = match frame.function.chunk.spans.get(at) {
                Some(span) => format!(
                    "at {} (line {}, col {})",
                    frame.function.name, span.start.line, span.start.col
                ),
                None => format!("at {}", frame.function.name),
            };
            lines.push(line);
        }
        ExecError::Runtime {
            message,
            detail: if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            },
        }
    }
}

fn as_f64(v: &ScriptValue) -> f64 {
    match v {
        ScriptValue::Int(i) => *i as f64,
        ScriptValue::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn values_equal(lhs: &ScriptValue, rhs: &ScriptValue) -> bool {
    match (lhs, rhs) {
        (ScriptValue::Int(a), ScriptValue::Float(b))
        | (ScriptValue::Float(b), ScriptValue::Int(a)) => (*a as f64) == *b,
        _ => lhs == rhs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityError;
    use crate::compile;
    use crate::generate;
    use crate::parser;

    struct FakeHandle;

    impl CapabilityHandle for FakeHandle {
        fn invoke(
            &self,
            operation: &str,
            args: &[ScriptValue],
        ) -> Result<ScriptValue, CapabilityError> {
            match operation {
                "who_am_i" => Ok(ScriptValue::Str("user-1".into())),
                "fail" => Err(CapabilityError::new("operation rejected by platform")),
                _ => Ok(ScriptValue::List(args.to_vec())),
            }
        }
    }

    fn run(body: &str) -> Result<(ScriptValue, ExecStats), ExecError> {
        run_with(body, &VmBudget::default())
    }

    fn run_with(body: &str, budget: &VmBudget) -> Result<(ScriptValue, ExecStats), ExecError> {
        let unit = generate::wrap_script_body(body);
        let ast = parser::parse_unit(&unit.source).expect("body must parse");
        let module = compile::compile_unit(&ast, &unit.fingerprint).expect("body must compile");
        execute_entry(&module, &FakeHandle, budget)
    }

    #[test]
    fn arithmetic_and_return() {
        let (value, stats) = run("{ var x = 2 + 3 * 4; return x; }").unwrap();
        assert_eq!(value, ScriptValue::Int(14));
        assert!(stats.fuel_used > 0);
    }

    #[test]
    fn falls_off_the_end_returns_null() {
        let (value, _) = run("{ var x = 1; }").unwrap();
        assert_eq!(value, ScriptValue::Null);
    }

    #[test]
    fn capability_method_call_dispatches_to_handle() {
        let (value, _) = run("{ return service.who_am_i(); }").unwrap();
        assert_eq!(value, ScriptValue::Str("user-1".into()));
    }

    #[test]
    fn capability_failure_is_a_runtime_error_with_backtrace() {
        let err = run("{ return service.fail(); }").unwrap_err();
        match err {
            ExecError::Runtime { message, detail } => {
                assert_eq!(message, "operation rejected by platform");
                assert!(detail.unwrap().contains("at script_main (line"));
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn throw_renders_the_value() {
        let err = run("{ throw \"bad input\"; }").unwrap_err();
        match err {
            ExecError::Runtime { message, .. } => {
                assert_eq!(message, "script exception: bad input");
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_traps() {
        let err = run("{ var z = 0; return 1 / z; }").unwrap_err();
        match err {
            ExecError::Runtime { message, .. } => assert_eq!(message, "division by zero"),
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn infinite_loop_exhausts_fuel() {
        let budget = VmBudget {
            fuel: 10_000,
            ..VmBudget::default()
        };
        let err = run_with("{ while (true) { } return null; }", &budget).unwrap_err();
        match err {
            ExecError::Runtime { message, .. } => {
                assert_eq!(message, "fuel budget exhausted: max_fuel=10000");
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn unbounded_recursion_hits_call_depth() {
        let body = "{ return spin(0); } fn spin(n) { return spin(n + 1); }";
        let err = run(body).unwrap_err();
        match err {
            ExecError::Runtime { message, detail } => {
                assert!(message.starts_with("call depth budget exhausted"), "{message}");
                assert!(detail.unwrap().lines().count() > 1);
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn list_index_out_of_range_traps() {
        let err = run("{ var xs = [1, 2]; return xs[5]; }").unwrap_err();
        assert!(matches!(err, ExecError::Runtime { .. }));
    }

    #[test]
    fn missing_map_key_reads_null() {
        let (value, _) = run("{ var m = new Map(); return m[\"absent\"]; }").unwrap();
        assert_eq!(value, ScriptValue::Null);
    }

    #[test]
    fn map_member_and_index_assignment() {
        let body = "{ var m = new Map(); m[\"id\"] = 7; return m.id; }";
        let (value, _) = run(body).unwrap();
        assert_eq!(value, ScriptValue::Int(7));
    }

    #[test]
    fn short_circuit_and_does_not_evaluate_rhs() {
        let (value, _) = run("{ return false && service.fail(); }").unwrap();
        assert_eq!(value, ScriptValue::Bool(false));
    }

    #[test]
    fn string_concat_promotes_non_strings() {
        let (value, _) = run("{ return \"n=\" + 4; }").unwrap();
        assert_eq!(value, ScriptValue::Str("n=4".into()));
    }

    #[test]
    fn user_functions_call_each_other() {
        let body = "{ return double(add(1, 2)); } \
                    fn add(a, b) { return a + b; } \
                    fn double(x) { return x * 2; }";
        let (value, _) = run(body).unwrap();
        assert_eq!(value, ScriptValue::Int(6));
    }

    #[test]
    fn call_with_too_few_stack_values_is_internal() {
        use crate::compile::Chunk;
        use crate::diagnostics::Span;

        // A hand-built chunk whose call claims more arguments than the stack
        // holds must fail as an engine error, never a panic.
        let chunk = Chunk {
            ops: vec![Op::CallFunction { name: 0, argc: 4 }],
            consts: vec![Const::Str("script_main".into())],
            spans: vec![Span::point(1, 1)],
        };
        let mut functions = std::collections::BTreeMap::new();
        functions.insert(
            "script_main".to_string(),
            Function {
                name: "script_main".into(),
                arity: 1,
                chunk,
            },
        );
        let module = CompiledModule {
            functions,
            fingerprint: "deadbeef".into(),
        };
        let err = execute_entry(&module, &FakeHandle, &VmBudget::default()).unwrap_err();
        assert!(matches!(err, ExecError::Internal(_)));
    }

    #[test]
    fn missing_entry_is_internal() {
        let module = CompiledModule {
            functions: Default::default(),
            fingerprint: "deadbeef".into(),
        };
        let err = execute_entry(&module, &FakeHandle, &VmBudget::default()).unwrap_err();
        assert!(matches!(err, ExecError::Internal(_)));
    }
}
